//! Operation dispatcher: one recognized intent, exactly one adapter call.
//!
//! Extracts the entities each operation kind requires before touching the
//! adapter; missing required entities short-circuit to a `validation-error`
//! result with no CRM call at all. Transient adapter failures are retried
//! with exponential backoff up to a fixed bound; permanent failures surface
//! immediately. Per-session serialization is enforced upstream by the
//! orchestrator's session workers, so this type is freely shared.

use serde_json::Value;
use tokio::time::{sleep, timeout};

use std::sync::Arc;
use std::time::Duration;

use crmpilot_types::crm::{CustomerData, CustomerQuery, OperationResult, OrderData, OrderLine};
use crmpilot_types::error::AdapterError;
use crmpilot_types::intent::{Intent, IntentKind};

use crate::adapter::CrmAdapter;

const DEFAULT_SEARCH_LIMIT: u32 = 10;

/// Maps intents onto adapter operations and owns the retry policy.
pub struct OperationDispatcher<A> {
    adapter: Arc<A>,
    retry_limit: u32,
    backoff_base: Duration,
    adapter_timeout: Duration,
}

/// One fully validated adapter call, ready to execute.
#[derive(Debug)]
enum PlannedCall {
    CreateCustomer(CustomerData),
    SearchCustomers(CustomerQuery),
    UpdateCustomer { customer_id: String, update: CustomerData },
    CreateOrder(OrderData),
    SearchProducts { query: String, limit: u32 },
}

impl<A: CrmAdapter> OperationDispatcher<A> {
    pub fn new(
        adapter: Arc<A>,
        retry_limit: u32,
        backoff_base: Duration,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            adapter,
            retry_limit,
            backoff_base,
            adapter_timeout,
        }
    }

    /// Execute the single adapter operation for a recognized intent.
    ///
    /// Always resolves to an [`OperationResult`]; adapter errors are folded
    /// into failed results carrying their classification label.
    pub async fn dispatch(&self, intent: &Intent) -> OperationResult {
        let call = match Self::plan(intent) {
            Ok(call) => call,
            Err(message) => return OperationResult::validation_error(message),
        };

        let mut attempt = 0u32;
        loop {
            let outcome = timeout(self.adapter_timeout, self.execute(&call)).await;
            let err = match outcome {
                Ok(Ok(result)) => return result,
                Ok(Err(err)) => err,
                Err(_) => AdapterError::Timeout,
            };

            if err.is_transient() && attempt < self.retry_limit {
                let delay = self.backoff_base * 2u32.saturating_pow(attempt);
                attempt += 1;
                tracing::warn!(
                    adapter = self.adapter.name(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient CRM failure, retrying"
                );
                sleep(delay).await;
                continue;
            }

            tracing::error!(
                adapter = self.adapter.name(),
                attempts = attempt + 1,
                error = %err,
                "CRM operation failed"
            );
            return OperationResult::failed(
                "The CRM could not complete the operation.",
                err.code(),
                Some(err.to_string()),
            );
        }
    }

    async fn execute(&self, call: &PlannedCall) -> Result<OperationResult, AdapterError> {
        match call {
            PlannedCall::CreateCustomer(customer) => self.adapter.create_customer(customer).await,
            PlannedCall::SearchCustomers(query) => self.adapter.search_customers(query).await,
            PlannedCall::UpdateCustomer {
                customer_id,
                update,
            } => self.adapter.update_customer(customer_id, update).await,
            PlannedCall::CreateOrder(order) => self.adapter.create_order(order).await,
            PlannedCall::SearchProducts { query, limit } => {
                self.adapter.search_products(query, *limit).await
            }
        }
    }

    /// Validate entity requirements per kind without calling the adapter.
    fn plan(intent: &Intent) -> Result<PlannedCall, String> {
        match intent.kind {
            IntentKind::CreateCustomer => {
                let name = intent
                    .entity_str("name")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or("A customer name is required to create a customer.")?;
                Ok(PlannedCall::CreateCustomer(CustomerData {
                    name: name.to_string(),
                    email: owned_entity(intent, "email"),
                    phone: owned_entity(intent, "phone"),
                    company: owned_entity(intent, "company"),
                    address: owned_entity(intent, "address"),
                    notes: owned_entity(intent, "notes"),
                }))
            }
            IntentKind::SearchCustomer => {
                // A bare "list my customers" is valid: empty criteria list
                // the most recent records.
                let name = owned_entity(intent, "name").or_else(|| owned_entity(intent, "query"));
                Ok(PlannedCall::SearchCustomers(CustomerQuery {
                    name,
                    email: owned_entity(intent, "email"),
                    phone: owned_entity(intent, "phone"),
                    company: owned_entity(intent, "company"),
                    limit: entity_u32(intent, "limit").unwrap_or(DEFAULT_SEARCH_LIMIT),
                }))
            }
            IntentKind::UpdateCustomer => {
                let customer_id = intent
                    .entity_str("customer_id")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or("I need to know which customer to update.")?
                    .to_string();
                let update = CustomerData {
                    name: owned_entity(intent, "name").unwrap_or_default(),
                    email: owned_entity(intent, "email"),
                    phone: owned_entity(intent, "phone"),
                    company: owned_entity(intent, "company"),
                    address: owned_entity(intent, "address"),
                    notes: owned_entity(intent, "notes"),
                };
                if update.name.is_empty()
                    && update.email.is_none()
                    && update.phone.is_none()
                    && update.company.is_none()
                    && update.address.is_none()
                    && update.notes.is_none()
                {
                    return Err("Tell me which field to change on that customer.".to_string());
                }
                Ok(PlannedCall::UpdateCustomer {
                    customer_id,
                    update,
                })
            }
            IntentKind::CreateOrder => {
                let customer_id = intent
                    .entity_str("customer_id")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or("An order needs a customer.")?
                    .to_string();
                let lines = order_lines(intent)
                    .ok_or("An order needs at least one product.")?;
                Ok(PlannedCall::CreateOrder(OrderData {
                    customer_id,
                    lines,
                    notes: owned_entity(intent, "notes"),
                }))
            }
            IntentKind::SearchProduct => Ok(PlannedCall::SearchProducts {
                query: owned_entity(intent, "name")
                    .or_else(|| owned_entity(intent, "query"))
                    .unwrap_or_default(),
                limit: entity_u32(intent, "limit").unwrap_or(DEFAULT_SEARCH_LIMIT),
            }),
            IntentKind::Unknown => {
                Err("There is no CRM operation for an unrecognized request.".to_string())
            }
        }
    }
}

fn owned_entity(intent: &Intent, name: &str) -> Option<String> {
    intent
        .entity_str(name)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn entity_u32(intent: &Intent, name: &str) -> Option<u32> {
    intent
        .entities
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

/// Accept either `{product_id, quantity}` entities or a `lines` array of
/// `{product_id, quantity}` objects.
fn order_lines(intent: &Intent) -> Option<Vec<OrderLine>> {
    if let Some(Value::Array(raw_lines)) = intent.entities.get("lines") {
        let lines: Vec<OrderLine> = raw_lines
            .iter()
            .filter_map(|line| {
                let product_id = line.get("product_id")?.as_str()?.to_string();
                let quantity = line
                    .get("quantity")
                    .and_then(Value::as_u64)
                    .and_then(|q| u32::try_from(q).ok())
                    .unwrap_or(1);
                Some(OrderLine {
                    product_id,
                    quantity,
                })
            })
            .collect();
        return (!lines.is_empty()).then_some(lines);
    }

    let product_id = intent.entity_str("product_id")?.to_string();
    Some(vec![OrderLine {
        product_id,
        quantity: entity_u32(intent, "quantity").unwrap_or(1),
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmpilot_types::crm::OperationResult;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Adapter whose responses are scripted per call index.
    #[derive(Default)]
    struct ScriptedAdapter {
        calls: AtomicU32,
        script: Mutex<Vec<Result<OperationResult, AdapterError>>>,
    }

    impl ScriptedAdapter {
        fn with_script(script: Vec<Result<OperationResult, AdapterError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script: Mutex::new(script),
            }
        }

        fn next(&self) -> Result<OperationResult, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(OperationResult::ok_empty("done"))
            } else {
                script.remove(0)
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CrmAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn test_connection(&self) -> Result<OperationResult, AdapterError> {
            self.next()
        }

        async fn create_customer(
            &self,
            _customer: &CustomerData,
        ) -> Result<OperationResult, AdapterError> {
            self.next()
        }

        async fn search_customers(
            &self,
            _query: &CustomerQuery,
        ) -> Result<OperationResult, AdapterError> {
            self.next()
        }

        async fn update_customer(
            &self,
            _customer_id: &str,
            _update: &CustomerData,
        ) -> Result<OperationResult, AdapterError> {
            self.next()
        }

        async fn create_order(&self, _order: &OrderData) -> Result<OperationResult, AdapterError> {
            self.next()
        }

        async fn search_products(
            &self,
            _query: &str,
            _limit: u32,
        ) -> Result<OperationResult, AdapterError> {
            self.next()
        }
    }

    fn dispatcher(adapter: Arc<ScriptedAdapter>) -> OperationDispatcher<ScriptedAdapter> {
        OperationDispatcher::new(
            adapter,
            2,
            Duration::from_millis(1),
            Duration::from_millis(200),
        )
    }

    fn intent(kind: IntentKind, entities: &[(&str, Value)]) -> Intent {
        Intent {
            kind,
            entities: entities
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
            confidence: 0.9,
            detail: None,
        }
    }

    #[tokio::test]
    async fn missing_required_entity_never_calls_adapter() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(IntentKind::CreateCustomer, &[]))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("validation-error"));
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        // Scenario: two transient failures, success on the third attempt.
        let adapter = Arc::new(ScriptedAdapter::with_script(vec![
            Err(AdapterError::Network("refused".to_string())),
            Err(AdapterError::Timeout),
            Ok(OperationResult::ok_empty("customer created")),
        ]));
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(
                IntentKind::CreateCustomer,
                &[("name", Value::from("Li Si"))],
            ))
            .await;

        assert!(result.success);
        assert_eq!(adapter.call_count(), 3);
    }

    #[tokio::test]
    async fn transient_exhaustion_respects_retry_bound() {
        let adapter = Arc::new(ScriptedAdapter::with_script(vec![
            Err(AdapterError::Timeout),
            Err(AdapterError::Timeout),
            Err(AdapterError::Timeout),
            Err(AdapterError::Timeout),
        ]));
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(
                IntentKind::SearchCustomer,
                &[("name", Value::from("Li"))],
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("adapter-timeout"));
        // 1 initial attempt + retry_limit retries.
        assert_eq!(adapter.call_count(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_attempted_exactly_once() {
        let adapter = Arc::new(ScriptedAdapter::with_script(vec![Err(
            AdapterError::Rejected("duplicate email".to_string()),
        )]));
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(
                IntentKind::CreateCustomer,
                &[("name", Value::from("Li Si"))],
            ))
            .await;

        assert!(!result.success);
        assert_eq!(result.error_code.as_deref(), Some("adapter-rejected"));
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_customer_search_is_allowed() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(IntentKind::SearchCustomer, &[]))
            .await;

        assert!(result.success);
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn update_without_fields_is_validation_error() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(
                IntentKind::UpdateCustomer,
                &[("customer_id", Value::from("c1"))],
            ))
            .await;

        assert!(!result.success);
        assert_eq!(adapter.call_count(), 0);
    }

    #[tokio::test]
    async fn order_from_flat_entities_defaults_quantity() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher
            .dispatch(&intent(
                IntentKind::CreateOrder,
                &[
                    ("customer_id", Value::from("c1")),
                    ("product_id", Value::from("p1")),
                ],
            ))
            .await;

        assert!(result.success);
        assert_eq!(adapter.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_intent_never_reaches_adapter() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let dispatcher = dispatcher(adapter.clone());

        let result = dispatcher.dispatch(&Intent::unknown("low-confidence")).await;

        assert!(!result.success);
        assert_eq!(adapter.call_count(), 0);
    }
}
