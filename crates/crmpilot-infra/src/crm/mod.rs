//! CRM adapter implementations.
//!
//! [`AnyCrmAdapter`] wraps the concrete adapters in a delegating enum so the
//! orchestrator stays monomorphic while the adapter choice remains a
//! runtime configuration decision.

pub mod mock;
pub mod odoo;

pub use mock::MockCrmAdapter;
pub use odoo::OdooAdapter;

use crmpilot_core::adapter::CrmAdapter;
use crmpilot_types::config::CrmConfig;
use crmpilot_types::crm::{CustomerData, CustomerQuery, OperationResult, OrderData};
use crmpilot_types::error::AdapterError;

/// Runtime-selected CRM backend.
#[derive(Debug)]
pub enum AnyCrmAdapter {
    Mock(MockCrmAdapter),
    Odoo(OdooAdapter),
}

impl AnyCrmAdapter {
    /// Build the adapter named by `config.crm.adapter`.
    pub fn from_config(config: &CrmConfig) -> Result<Self, AdapterError> {
        match config.adapter.as_str() {
            "mock" => Ok(AnyCrmAdapter::Mock(MockCrmAdapter::seeded())),
            "odoo" => Ok(AnyCrmAdapter::Odoo(OdooAdapter::from_config(config)?)),
            other => Err(AdapterError::Config(format!(
                "unknown CRM adapter '{other}' (expected \"mock\" or \"odoo\")"
            ))),
        }
    }
}

impl CrmAdapter for AnyCrmAdapter {
    fn name(&self) -> &str {
        match self {
            AnyCrmAdapter::Mock(a) => a.name(),
            AnyCrmAdapter::Odoo(a) => a.name(),
        }
    }

    async fn test_connection(&self) -> Result<OperationResult, AdapterError> {
        match self {
            AnyCrmAdapter::Mock(a) => a.test_connection().await,
            AnyCrmAdapter::Odoo(a) => a.test_connection().await,
        }
    }

    async fn create_customer(
        &self,
        customer: &CustomerData,
    ) -> Result<OperationResult, AdapterError> {
        match self {
            AnyCrmAdapter::Mock(a) => a.create_customer(customer).await,
            AnyCrmAdapter::Odoo(a) => a.create_customer(customer).await,
        }
    }

    async fn search_customers(
        &self,
        query: &CustomerQuery,
    ) -> Result<OperationResult, AdapterError> {
        match self {
            AnyCrmAdapter::Mock(a) => a.search_customers(query).await,
            AnyCrmAdapter::Odoo(a) => a.search_customers(query).await,
        }
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: &CustomerData,
    ) -> Result<OperationResult, AdapterError> {
        match self {
            AnyCrmAdapter::Mock(a) => a.update_customer(customer_id, update).await,
            AnyCrmAdapter::Odoo(a) => a.update_customer(customer_id, update).await,
        }
    }

    async fn create_order(&self, order: &OrderData) -> Result<OperationResult, AdapterError> {
        match self {
            AnyCrmAdapter::Mock(a) => a.create_order(order).await,
            AnyCrmAdapter::Odoo(a) => a.create_order(order).await,
        }
    }

    async fn search_products(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<OperationResult, AdapterError> {
        match self {
            AnyCrmAdapter::Mock(a) => a.search_products(query, limit).await,
            AnyCrmAdapter::Odoo(a) => a.search_products(query, limit).await,
        }
    }
}
