//! CrmAdapter trait definition.
//!
//! The operation contract every CRM backend must satisfy. The dispatcher
//! depends only on this trait, never on a concrete CRM's types. Uses native
//! async fn in traits (RPITIT, Rust 2024 edition); implementations live in
//! `crmpilot-infra` (e.g. `MockCrmAdapter`, `OdooAdapter`).

use crmpilot_types::crm::{CustomerData, CustomerQuery, OperationResult, OrderData};
use crmpilot_types::error::AdapterError;

/// Trait for CRM backends.
///
/// Every method performs exactly one side-effecting or read-only CRM call
/// and returns an [`OperationResult`] on business-level completion, or an
/// [`AdapterError`] whose transient/permanent classification drives the
/// dispatcher's retry policy.
pub trait CrmAdapter: Send + Sync {
    /// Human-readable adapter name (e.g. "mock", "odoo").
    fn name(&self) -> &str;

    /// Verify connectivity and credentials without side effects.
    fn test_connection(
        &self,
    ) -> impl std::future::Future<Output = Result<OperationResult, AdapterError>> + Send;

    /// Create a new customer record.
    fn create_customer(
        &self,
        customer: &CustomerData,
    ) -> impl std::future::Future<Output = Result<OperationResult, AdapterError>> + Send;

    /// Search customers by partial-match criteria.
    fn search_customers(
        &self,
        query: &CustomerQuery,
    ) -> impl std::future::Future<Output = Result<OperationResult, AdapterError>> + Send;

    /// Update fields on an existing customer.
    fn update_customer(
        &self,
        customer_id: &str,
        update: &CustomerData,
    ) -> impl std::future::Future<Output = Result<OperationResult, AdapterError>> + Send;

    /// Create a sales order.
    fn create_order(
        &self,
        order: &OrderData,
    ) -> impl std::future::Future<Output = Result<OperationResult, AdapterError>> + Send;

    /// Search products by name.
    fn search_products(
        &self,
        query: &str,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<OperationResult, AdapterError>> + Send;
}
