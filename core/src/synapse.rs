use async_trait::async_trait;

/// Synapse: The Integration Layer
///
/// A Synapse represents a connection to an external system whose output the
/// workflow consumes but does not control, such as a text-generation service.
/// It has no retry policy of its own: callers decide what a failure means.
#[async_trait]
pub trait Synapse: Send + Sync {
    type Input: Send;
    type Output: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Executes the integration call (e.g., HTTP request to a model server)
    async fn call(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}
