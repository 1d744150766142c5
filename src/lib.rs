pub mod api;
pub mod billing;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod fulfillment;
pub mod ledger;
pub mod mailer;
pub mod models;
pub mod payments;
pub mod pricing;
pub mod storage;
pub mod tools;

use std::sync::Arc;

use crate::billing::CreditLedger;
use crate::config::Config;
use crate::fulfillment::Fulfillment;
use crate::ledger::OperationLedger;
use crate::mailer::Mailer;
use crate::payments::CheckoutGateway;
use crate::pricing::ToolCatalog;
use crate::storage::ArtifactStore;
use crate::tools::media::DurationProbe;
use crate::tools::ToolExecutor;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<dyn ToolCatalog>,
    pub credits: Arc<dyn CreditLedger>,
    pub operations: Arc<dyn OperationLedger>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub checkout: Arc<dyn CheckoutGateway>,
    pub probe: Arc<dyn DurationProbe>,
    pub executor: ToolExecutor,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn fulfillment(&self) -> Fulfillment<'_> {
        Fulfillment {
            catalog: self.catalog.as_ref(),
            credits: self.credits.as_ref(),
            operations: self.operations.as_ref(),
            artifacts: self.artifacts.as_ref(),
            checkout: self.checkout.as_ref(),
            probe: self.probe.as_ref(),
            executor: &self.executor,
        }
    }
}
