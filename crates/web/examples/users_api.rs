//! A users API over an in-memory store.
//!
//! ```text
//! cargo run --example users_api [config.toml]
//! curl -s localhost:8080/users
//! curl -s -X POST localhost:8080/users -H 'Authorization: Bearer <token>' \
//!     -H 'Content-Type: application/json' -d '{"username":"alice","email":"alice@example.com","password":"secret123"}'
//! ```
//!
//! The token to use is logged at startup.

use http::StatusCode;
use micro_api::config::{AppConfig, ConfigLookup};
use micro_api::middleware::AuthMiddleware;
use micro_api::token::SignedTokenValidator;
use micro_api::validation::Validator;
use micro_api::{Dispatcher, HandlerError, RequestContext, ResponseBuilder, RouteTable, Server, handler_fn, logging};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, info};

const DEFAULT_CONFIG: &str = r#"
[server]
address = "127.0.0.1:8080"
dispatch_timeout_ms = 5000

[auth]
secret = "change-me"
"#;

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u64,
    username: String,
    email: String,
}

/// Stands in for the database.
#[derive(Debug, Default)]
struct UserStore {
    users: Mutex<BTreeMap<u64, User>>,
}

impl UserStore {
    fn all(&self) -> Vec<User> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect()
    }

    fn find(&self, id: u64) -> Option<User> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }

    fn email_taken(&self, email: &str, except: Option<u64>) -> bool {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        users.values().any(|user| user.email == email && Some(user.id) != except)
    }

    fn create(&self, username: String, email: String) -> User {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = User { id, username, email };
        users.insert(id, user.clone());
        user
    }

    fn update(&self, id: u64, fields: &Map<String, Value>) -> Option<User> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        let user = users.get_mut(&id)?;
        if let Some(username) = fields.get("username").and_then(Value::as_str) {
            username.clone_into(&mut user.username);
        }
        if let Some(email) = fields.get("email").and_then(Value::as_str) {
            email.clone_into(&mut user.email);
        }
        Some(user.clone())
    }

    fn delete(&self, id: u64) -> bool {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).remove(&id).is_some()
    }
}

fn string_field(req: &RequestContext, field: &str) -> String {
    req.input(field).and_then(Value::as_str).unwrap_or_default().to_owned()
}

fn not_found(resp: &mut ResponseBuilder) -> Result<(), HandlerError> {
    resp.error("User not found", StatusCode::NOT_FOUND)?;
    Ok(())
}

fn routes() -> Result<RouteTable, Box<dyn std::error::Error>> {
    let mut routes = RouteTable::new();
    routes
        .get("/users", "UserController@index", &[])?
        .get("/users/:id", "UserController@show", &[])?
        .post("/users", "UserController@store", &["auth"])?
        .put("/users/:id", "UserController@update", &["auth"])?
        .delete("/users/:id", "UserController@destroy", &["auth"])?;
    Ok(routes)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(Level::INFO)?;

    let config = match std::env::args().nth(1) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_toml(DEFAULT_CONFIG)?,
    };

    let secret = config.get("auth.secret").unwrap_or_default();
    let claims = json!({ "sub": "demo" });
    if let Some(claims) = claims.as_object() {
        info!(token = %SignedTokenValidator::issue(claims, &secret), "demo bearer token");
    }

    let store = Arc::new(UserStore::default());
    let create_rules = Validator::new(&[
        ("username", "required|string|min:3|max:50"),
        ("email", "required|email"),
        ("password", "required|min:8"),
    ])?;
    let update_rules = Validator::new(&[("username", "string|min:3|max:50"), ("email", "email")])?;

    let mut builder = Dispatcher::builder(routes()?)
        .middleware("auth", AuthMiddleware::from_config(&config, SignedTokenValidator::new())?);
    if let Some(timeout) = config.dispatch_timeout()? {
        builder = builder.timeout(timeout);
    }

    let index_store = Arc::clone(&store);
    let show_store = Arc::clone(&store);
    let store_store = Arc::clone(&store);
    let update_store = Arc::clone(&store);
    let destroy_store = store;

    let dispatcher = builder
        .handler(
            "UserController@index",
            handler_fn(move |_req, resp| {
                resp.success(index_store.all(), "Users retrieved")?;
                Ok(())
            }),
        )
        .handler(
            "UserController@show",
            handler_fn(move |req, resp| {
                let id: u64 = req.path_param_as("id")?;
                match show_store.find(id) {
                    Some(user) => resp.success(user, "User retrieved")?,
                    None => return not_found(resp),
                }
                Ok(())
            }),
        )
        .handler(
            "UserController@store",
            handler_fn(move |req, resp| {
                let errors = create_rules.validate(req.body());
                if !errors.is_empty() {
                    resp.error_with_validation("Validation failed", StatusCode::UNPROCESSABLE_ENTITY, errors)?;
                    return Ok(());
                }

                let email = string_field(req, "email");
                if store_store.email_taken(&email, None) {
                    resp.error("Email already exists", StatusCode::CONFLICT)?;
                    return Ok(());
                }

                let user = store_store.create(string_field(req, "username"), email);
                resp.success_with_status(user, "User created", StatusCode::CREATED)?;
                Ok(())
            }),
        )
        .handler(
            "UserController@update",
            handler_fn(move |req, resp| {
                let id: u64 = req.path_param_as("id")?;
                let errors = update_rules.validate(req.body());
                if !errors.is_empty() {
                    resp.error_with_validation("Validation failed", StatusCode::UNPROCESSABLE_ENTITY, errors)?;
                    return Ok(());
                }

                if let Some(email) = req.input("email").and_then(Value::as_str)
                    && update_store.email_taken(email, Some(id))
                {
                    resp.error("Email already exists", StatusCode::CONFLICT)?;
                    return Ok(());
                }

                match update_store.update(id, req.body()) {
                    Some(user) => resp.success(user, "User updated")?,
                    None => return not_found(resp),
                }
                Ok(())
            }),
        )
        .handler(
            "UserController@destroy",
            handler_fn(move |req, resp| {
                let id: u64 = req.path_param_as("id")?;
                if !destroy_store.delete(id) {
                    return not_found(resp);
                }
                resp.success(Value::Null, "User deleted")?;
                Ok(())
            }),
        )
        .build();

    Server::builder().dispatcher(dispatcher).address(config.server_address()?).build()?.start().await?;
    Ok(())
}
