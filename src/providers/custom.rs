use async_trait::async_trait;

use super::{GrabbedMatch, ProviderAdapter, ProviderError};
use crate::matches::Provider;

/// Matches entered by hand; there is nothing to grab.
pub struct CustomProvider;

#[async_trait]
impl ProviderAdapter for CustomProvider {
    fn provider(&self) -> Provider {
        Provider::Custom
    }

    fn url_prefix(&self) -> Option<&str> {
        None
    }

    async fn grab(&self, _id: u64) -> Result<GrabbedMatch, ProviderError> {
        Err(ProviderError::unsupported(Provider::Custom))
    }
}
