//! Minimal keel example: an in-memory user controller.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/1
//!   curl 'http://localhost:3000/users?page=1'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X DELETE http://localhost:3000/users/1

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use keel::codec::Shape;
use keel::{Args, Dispatcher, HandlerFault, Json, Router, Scalar, Server, Signature, StatusCode};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize)]
struct User {
    id: i64,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

type Shared = Arc<Mutex<Store>>;

fn lock(store: &Shared) -> Result<std::sync::MutexGuard<'_, Store>, HandlerFault> {
    store.lock().map_err(|_| HandlerFault::new("user store is poisoned"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let store: Shared = Arc::default();
    let new_user: Shape = Shape::object().field("name", Shape::String).into();
    let by_id = || Signature::new().path("id", Scalar::Integer);

    let routes = Router::new()
        .get("/users", Signature::new().query_or("page", Scalar::Integer, "1"), {
            let store = store.clone();
            move |args: Args| list_users(store.clone(), args)
        })
        .get("/users/{id}", by_id(), {
            let store = store.clone();
            move |args: Args| get_user(store.clone(), args)
        })
        .post("/users", Signature::new().body("user", new_user), {
            let store = store.clone();
            move |args: Args| create_user(store.clone(), args)
        })
        .delete("/users/{id}", by_id(), {
            let store = store.clone();
            move |args: Args| delete_user(store.clone(), args)
        });

    let dispatcher = Dispatcher::builder()
        .handler_timeout(Duration::from_secs(10))
        .build(routes);

    Server::bind("0.0.0.0:3000")
        .expect("valid address")
        .serve(dispatcher)
        .await
        .expect("server error");
}

// GET /users?page=N, ten users per page.
async fn list_users(store: Shared, args: Args) -> Result<Json<Vec<User>>, HandlerFault> {
    let page = args.int("page").unwrap_or(1).max(1);
    let skip = usize::try_from((page - 1).saturating_mul(10)).unwrap_or(usize::MAX);
    let store = lock(&store)?;
    let users = store.users.values()
        .skip(skip)
        .take(10)
        .cloned()
        .collect();
    Ok(Json(users))
}

// GET /users/{id}
async fn get_user(store: Shared, args: Args) -> Result<Json<User>, HandlerFault> {
    let id = args.int("id").unwrap_or_default();
    let store = lock(&store)?;
    store.users.get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| HandlerFault::not_found(format!("no user {id}")))
}

// POST /users
async fn create_user(store: Shared, args: Args) -> Result<Json<User>, HandlerFault> {
    let NewUser { name } = args.body_as()?;
    let mut store = lock(&store)?;
    store.next_id += 1;
    let user = User { id: store.next_id, name };
    store.users.insert(user.id, user.clone());
    Ok(Json(user))
}

// DELETE /users/{id}
async fn delete_user(store: Shared, args: Args) -> Result<String, HandlerFault> {
    let id = args.int("id").unwrap_or_default();
    match lock(&store)?.users.remove(&id) {
        Some(user) => Ok(format!("deleted {}", user.name)),
        None => Err(HandlerFault::with_status(StatusCode::NOT_FOUND, format!("no user {id}"))),
    }
}
