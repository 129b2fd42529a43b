//! Odoo CRM adapter over JSON-RPC.
//!
//! Talks to Odoo's stateless `/jsonrpc` endpoint: `common.authenticate` to
//! obtain a uid (cached for the adapter's lifetime), then `object.execute_kw`
//! against `res.partner`, `product.product`, and `sale.order`. Connection
//! and timeout failures classify as transient; authentication failures and
//! server-side faults classify as permanent.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use std::time::Duration;

use crmpilot_core::adapter::CrmAdapter;
use crmpilot_types::config::CrmConfig;
use crmpilot_types::crm::{CustomerData, CustomerQuery, OperationResult, OrderData};
use crmpilot_types::error::AdapterError;

/// Odoo JSON-RPC CRM backend.
#[derive(Debug)]
pub struct OdooAdapter {
    client: reqwest::Client,
    base_url: String,
    database: String,
    username: String,
    password: SecretString,
    /// Cached uid from `common.authenticate`.
    uid: Mutex<Option<i64>>,
}

impl OdooAdapter {
    /// Build from the `[crm]` config section. Requires url, database,
    /// username, and password.
    pub fn from_config(config: &CrmConfig) -> Result<Self, AdapterError> {
        let base_url = config
            .url
            .as_deref()
            .ok_or_else(|| AdapterError::Config("crm.url is required for odoo".to_string()))?
            .trim_end_matches('/')
            .to_string();
        let database = config
            .database
            .clone()
            .ok_or_else(|| AdapterError::Config("crm.database is required for odoo".to_string()))?;
        let username = config
            .username
            .clone()
            .ok_or_else(|| AdapterError::Config("crm.username is required for odoo".to_string()))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| AdapterError::Config("crm.password is required for odoo".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AdapterError::Config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            database,
            username,
            password,
            uid: Mutex::new(None),
        })
    }

    /// One JSON-RPC round trip to `/jsonrpc`.
    async fn rpc(&self, service: &str, method: &str, args: Value) -> Result<Value, AdapterError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {"service": service, "method": method, "args": args},
            "id": 1,
        });

        let response = self
            .client
            .post(format!("{}/jsonrpc", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AdapterError::Timeout
                } else {
                    AdapterError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AdapterError::Network(format!("odoo returned {status}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::Network(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = payload.get("error") {
            let message = error
                .pointer("/data/message")
                .or_else(|| error.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown odoo fault")
                .to_string();
            if message.contains("AccessDenied") || message.contains("Access Denied") {
                return Err(AdapterError::Unauthorized(message));
            }
            return Err(AdapterError::Rejected(message));
        }

        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Authenticate once and cache the uid.
    async fn uid(&self) -> Result<i64, AdapterError> {
        let mut uid = self.uid.lock().await;
        if let Some(cached) = *uid {
            return Ok(cached);
        }

        let result = self
            .rpc(
                "common",
                "authenticate",
                json!([
                    self.database,
                    self.username,
                    self.password.expose_secret(),
                    {}
                ]),
            )
            .await?;

        let fresh = result.as_i64().filter(|id| *id > 0).ok_or_else(|| {
            AdapterError::Unauthorized("odoo authentication returned no uid".to_string())
        })?;
        tracing::info!(uid = fresh, database = %self.database, "authenticated with odoo");
        *uid = Some(fresh);
        Ok(fresh)
    }

    /// `object.execute_kw` with the cached credentials.
    async fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value, AdapterError> {
        let uid = self.uid().await?;
        self.rpc(
            "object",
            "execute_kw",
            json!([
                self.database,
                uid,
                self.password.expose_secret(),
                model,
                method,
                args,
                kwargs
            ]),
        )
        .await
    }
}

fn partner_fields(customer: &CustomerData) -> Value {
    let mut fields = Map::new();
    if !customer.name.is_empty() {
        fields.insert("name".to_string(), Value::from(customer.name.clone()));
    }
    if let Some(email) = &customer.email {
        fields.insert("email".to_string(), Value::from(email.clone()));
    }
    if let Some(phone) = &customer.phone {
        fields.insert("phone".to_string(), Value::from(phone.clone()));
    }
    if let Some(company) = &customer.company {
        fields.insert("company_name".to_string(), Value::from(company.clone()));
    }
    if let Some(address) = &customer.address {
        fields.insert("street".to_string(), Value::from(address.clone()));
    }
    if let Some(notes) = &customer.notes {
        fields.insert("comment".to_string(), Value::from(notes.clone()));
    }
    Value::Object(fields)
}

fn customer_domain(query: &CustomerQuery) -> Value {
    let mut clauses = Vec::new();
    if let Some(name) = &query.name {
        clauses.push(json!(["name", "ilike", name]));
    }
    if let Some(email) = &query.email {
        clauses.push(json!(["email", "ilike", email]));
    }
    if let Some(phone) = &query.phone {
        clauses.push(json!(["phone", "ilike", phone]));
    }
    if let Some(company) = &query.company {
        clauses.push(json!(["company_name", "ilike", company]));
    }
    Value::Array(clauses)
}

impl CrmAdapter for OdooAdapter {
    fn name(&self) -> &str {
        "odoo"
    }

    async fn test_connection(&self) -> Result<OperationResult, AdapterError> {
        let version = self.rpc("common", "version", json!([])).await?;
        self.uid().await?;
        let server = version
            .get("server_version")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        Ok(OperationResult::ok_empty(format!(
            "Connected to Odoo {server}."
        )))
    }

    async fn create_customer(
        &self,
        customer: &CustomerData,
    ) -> Result<OperationResult, AdapterError> {
        let result = self
            .execute_kw(
                "res.partner",
                "create",
                json!([partner_fields(customer)]),
                json!({}),
            )
            .await?;
        let id = result
            .as_i64()
            .ok_or_else(|| AdapterError::Rejected("create returned no id".to_string()))?;

        let mut data = Map::new();
        data.insert("customer_id".to_string(), Value::from(id.to_string()));
        Ok(OperationResult::ok(
            format!("Customer {} created.", customer.name),
            data,
        ))
    }

    async fn search_customers(
        &self,
        query: &CustomerQuery,
    ) -> Result<OperationResult, AdapterError> {
        let result = self
            .execute_kw(
                "res.partner",
                "search_read",
                json!([customer_domain(query)]),
                json!({
                    "fields": ["id", "name", "email", "phone", "company_name"],
                    "limit": query.limit,
                }),
            )
            .await?;

        let customers = result.as_array().cloned().unwrap_or_default();
        let count = customers.len();
        let mut data = Map::new();
        data.insert("customers".to_string(), Value::Array(customers));
        data.insert("count".to_string(), Value::from(count));
        Ok(OperationResult::ok(format!("Found {count} customers."), data))
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: &CustomerData,
    ) -> Result<OperationResult, AdapterError> {
        let id: i64 = customer_id
            .parse()
            .map_err(|_| AdapterError::NotFound(customer_id.to_string()))?;

        let written = self
            .execute_kw(
                "res.partner",
                "write",
                json!([[id], partner_fields(update)]),
                json!({}),
            )
            .await?;
        if written.as_bool() != Some(true) {
            return Err(AdapterError::Rejected(format!(
                "odoo refused write on partner {id}"
            )));
        }

        let mut data = Map::new();
        data.insert("customer_id".to_string(), Value::from(customer_id));
        Ok(OperationResult::ok("Customer updated.", data))
    }

    async fn create_order(&self, order: &OrderData) -> Result<OperationResult, AdapterError> {
        let partner_id: i64 = order
            .customer_id
            .parse()
            .map_err(|_| AdapterError::NotFound(order.customer_id.clone()))?;

        let lines: Vec<Value> = order
            .lines
            .iter()
            .map(|line| {
                let product_id: i64 = line.product_id.parse().unwrap_or(0);
                json!([0, 0, {"product_id": product_id, "product_uom_qty": line.quantity}])
            })
            .collect();

        let result = self
            .execute_kw(
                "sale.order",
                "create",
                json!([{ "partner_id": partner_id, "order_line": lines }]),
                json!({}),
            )
            .await?;
        let id = result
            .as_i64()
            .ok_or_else(|| AdapterError::Rejected("create returned no order id".to_string()))?;

        let mut data = Map::new();
        data.insert("order_id".to_string(), Value::from(id.to_string()));
        Ok(OperationResult::ok(format!("Order {id} created."), data))
    }

    async fn search_products(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<OperationResult, AdapterError> {
        let domain = if query.is_empty() {
            json!([])
        } else {
            json!([["name", "ilike", query]])
        };
        let result = self
            .execute_kw(
                "product.product",
                "search_read",
                json!([domain]),
                json!({"fields": ["id", "name", "list_price"], "limit": limit}),
            )
            .await?;

        let products = result.as_array().cloned().unwrap_or_default();
        let count = products.len();
        let mut data = Map::new();
        data.insert("products".to_string(), Value::Array(products));
        data.insert("count".to_string(), Value::from(count));
        Ok(OperationResult::ok(format!("Found {count} products."), data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>) -> CrmConfig {
        CrmConfig {
            adapter: "odoo".to_string(),
            url: url.map(str::to_string),
            database: Some("prod".to_string()),
            username: Some("bot".to_string()),
            password: Some(SecretString::from("hunter2")),
        }
    }

    #[test]
    fn missing_url_is_config_error() {
        let err = OdooAdapter::from_config(&config(None)).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let adapter = OdooAdapter::from_config(&config(Some("https://crm.example.com/"))).unwrap();
        assert_eq!(adapter.base_url, "https://crm.example.com");
    }

    #[test]
    fn partner_fields_skip_absent_values() {
        let fields = partner_fields(&CustomerData {
            name: "Li Si".to_string(),
            email: Some("lisi@example.com".to_string()),
            ..Default::default()
        });
        let obj = fields.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["email"], "lisi@example.com");
    }

    #[test]
    fn domain_builds_one_clause_per_criterion() {
        let domain = customer_domain(&CustomerQuery {
            name: Some("Li".to_string()),
            company: Some("Acme".to_string()),
            limit: 5,
            ..Default::default()
        });
        assert_eq!(domain.as_array().unwrap().len(), 2);
    }
}
