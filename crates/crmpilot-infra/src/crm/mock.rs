//! In-memory CRM adapter for development and tests.
//!
//! Holds customers, products, and orders behind a mutex and fulfils the
//! full `CrmAdapter` contract with deterministic ids. `seeded()` preloads
//! the fixture records the demo environment expects.

use serde_json::{Map, Value, json};

use std::sync::Mutex;

use crmpilot_core::adapter::CrmAdapter;
use crmpilot_types::crm::{CustomerData, CustomerQuery, OperationResult, OrderData};
use crmpilot_types::error::AdapterError;

#[derive(Debug, Clone)]
struct MockCustomer {
    id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    company: Option<String>,
}

#[derive(Debug, Clone)]
struct MockProduct {
    id: String,
    name: String,
    price: f64,
}

#[derive(Debug, Default)]
struct MockStore {
    customers: Vec<MockCustomer>,
    products: Vec<MockProduct>,
    orders: u64,
}

/// Mock CRM backend with in-memory state.
#[derive(Debug)]
pub struct MockCrmAdapter {
    store: Mutex<MockStore>,
}

impl MockCrmAdapter {
    /// An empty mock CRM.
    pub fn new() -> Self {
        Self {
            store: Mutex::new(MockStore::default()),
        }
    }

    /// A mock CRM preloaded with two customers and two products.
    pub fn seeded() -> Self {
        let adapter = Self::new();
        {
            let mut store = adapter.store.lock().expect("mock store lock poisoned");
            store.customers = vec![
                MockCustomer {
                    id: "mock-customer-1".to_string(),
                    name: "Zhang San".to_string(),
                    email: Some("zhangsan@example.com".to_string()),
                    phone: Some("13800138000".to_string()),
                    company: Some("Acme Trading A".to_string()),
                },
                MockCustomer {
                    id: "mock-customer-2".to_string(),
                    name: "Li Si".to_string(),
                    email: Some("lisi@example.com".to_string()),
                    phone: Some("13800138001".to_string()),
                    company: Some("Acme Trading B".to_string()),
                },
            ];
            store.products = vec![
                MockProduct {
                    id: "mock-product-1".to_string(),
                    name: "Enterprise Suite".to_string(),
                    price: 9999.0,
                },
                MockProduct {
                    id: "mock-product-2".to_string(),
                    name: "Professional Services".to_string(),
                    price: 2999.0,
                },
            ];
        }
        adapter
    }
}

impl Default for MockCrmAdapter {
    fn default() -> Self {
        Self::seeded()
    }
}

fn customer_json(c: &MockCustomer) -> Value {
    json!({
        "id": c.id,
        "name": c.name,
        "email": c.email,
        "phone": c.phone,
        "company": c.company,
    })
}

fn contains_ci(haystack: &Option<String>, needle: &str) -> bool {
    haystack
        .as_deref()
        .is_some_and(|h| h.to_lowercase().contains(&needle.to_lowercase()))
}

impl CrmAdapter for MockCrmAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn test_connection(&self) -> Result<OperationResult, AdapterError> {
        Ok(OperationResult::ok_empty("Mock CRM is ready."))
    }

    async fn create_customer(
        &self,
        customer: &CustomerData,
    ) -> Result<OperationResult, AdapterError> {
        let mut store = self.store.lock().expect("mock store lock poisoned");
        let id = format!("mock-customer-{}", store.customers.len() + 1);
        store.customers.push(MockCustomer {
            id: id.clone(),
            name: customer.name.clone(),
            email: customer.email.clone(),
            phone: customer.phone.clone(),
            company: customer.company.clone(),
        });

        let mut data = Map::new();
        data.insert("customer_id".to_string(), Value::from(id));
        Ok(OperationResult::ok(
            format!("Customer {} created.", customer.name),
            data,
        ))
    }

    async fn search_customers(
        &self,
        query: &CustomerQuery,
    ) -> Result<OperationResult, AdapterError> {
        let store = self.store.lock().expect("mock store lock poisoned");
        let matches: Vec<Value> = store
            .customers
            .iter()
            .filter(|c| {
                if query.is_empty() {
                    return true;
                }
                query
                    .name
                    .as_deref()
                    .is_some_and(|n| c.name.to_lowercase().contains(&n.to_lowercase()))
                    || query.email.as_deref().is_some_and(|e| contains_ci(&c.email, e))
                    || query.phone.as_deref().is_some_and(|p| contains_ci(&c.phone, p))
                    || query
                        .company
                        .as_deref()
                        .is_some_and(|co| contains_ci(&c.company, co))
            })
            .take(query.limit as usize)
            .map(customer_json)
            .collect();

        let count = matches.len();
        let mut data = Map::new();
        data.insert("customers".to_string(), Value::Array(matches));
        data.insert("count".to_string(), Value::from(count));
        Ok(OperationResult::ok(
            match count {
                0 => "No matching customers found.".to_string(),
                1 => "Found 1 customer.".to_string(),
                n => format!("Found {n} customers."),
            },
            data,
        ))
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: &CustomerData,
    ) -> Result<OperationResult, AdapterError> {
        let mut store = self.store.lock().expect("mock store lock poisoned");
        let Some(customer) = store.customers.iter_mut().find(|c| c.id == customer_id) else {
            return Err(AdapterError::NotFound(customer_id.to_string()));
        };

        if !update.name.is_empty() {
            customer.name = update.name.clone();
        }
        if update.email.is_some() {
            customer.email = update.email.clone();
        }
        if update.phone.is_some() {
            customer.phone = update.phone.clone();
        }
        if update.company.is_some() {
            customer.company = update.company.clone();
        }

        let mut data = Map::new();
        data.insert("customer".to_string(), customer_json(customer));
        Ok(OperationResult::ok(
            format!("Customer {} updated.", customer.name),
            data,
        ))
    }

    async fn create_order(&self, order: &OrderData) -> Result<OperationResult, AdapterError> {
        let mut store = self.store.lock().expect("mock store lock poisoned");
        if !store.customers.iter().any(|c| c.id == order.customer_id) {
            return Err(AdapterError::NotFound(order.customer_id.clone()));
        }

        let mut total = 0.0;
        for line in &order.lines {
            let Some(product) = store.products.iter().find(|p| p.id == line.product_id) else {
                return Err(AdapterError::NotFound(line.product_id.clone()));
            };
            total += product.price * f64::from(line.quantity);
        }

        store.orders += 1;
        let id = format!("mock-order-{}", store.orders);
        let mut data = Map::new();
        data.insert("order_id".to_string(), Value::from(id.clone()));
        data.insert("total".to_string(), Value::from(total));
        Ok(OperationResult::ok(format!("Order {id} created."), data))
    }

    async fn search_products(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<OperationResult, AdapterError> {
        let store = self.store.lock().expect("mock store lock poisoned");
        let matches: Vec<Value> = store
            .products
            .iter()
            .filter(|p| {
                query.is_empty() || p.name.to_lowercase().contains(&query.to_lowercase())
            })
            .take(limit as usize)
            .map(|p| json!({"id": p.id, "name": p.name, "price": p.price}))
            .collect();

        let count = matches.len();
        let mut data = Map::new();
        data.insert("products".to_string(), Value::Array(matches));
        data.insert("count".to_string(), Value::from(count));
        Ok(OperationResult::ok(format!("Found {count} products."), data))
    }
}
