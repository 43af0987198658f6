use std::sync::Arc;

use burrow_core::{LinkId, Storage};
use ipnet::IpNet;

#[derive(Clone)]
pub struct AppState {
    storage: Arc<dyn Storage>,
    base_url: Arc<str>,
    trusted_subnet: Option<IpNet>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            base_url: Arc::from(base_url.into()),
            trusted_subnet: None,
        }
    }

    pub fn with_trusted_subnet(mut self, subnet: Option<IpNet>) -> Self {
        self.trusted_subnet = subnet;
        self
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn trusted_subnet(&self) -> Option<&IpNet> {
        self.trusted_subnet.as_ref()
    }

    pub fn short_url(&self, id: LinkId) -> String {
        id.to_url(&self.base_url)
    }
}
