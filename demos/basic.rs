//! Minimal kiln example: closure handlers, path params, JSON and errors.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -H 'accept: application/json' http://localhost:3000/users/abc
//!   curl -X POST http://localhost:3000/users -d 'name=alice'
//!   curl -X POST http://localhost:3000/users/42 -d '_method=DELETE'
//!   curl http://localhost:3000/nowhere

use kiln::extract::Form;
use kiln::{Config, Dispatcher, Error, Json, PathParams, Response, Router, Server};
use serde::Serialize;

#[derive(Serialize)]
struct User {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    kiln::logging::init();

    // No `csrf` in the defaults, so plain curl POSTs go through.
    let config = Config::from_toml(
        r#"
        [app]
        env = "local"

        [middleware]
        default = ["trace"]
        "#,
    )?;

    let router = Router::new()
        .get("/", || async { "<h1>kiln</h1>" }).name("index")
        .get("/users/:id", get_user).name("users.show")
        .post("/users", create_user)
        .delete("/users/:id", delete_user);

    let dispatcher = Dispatcher::new(router, &config);
    Server::bind("0.0.0.0:3000")?.serve(dispatcher).await
}

// GET /users/:id
async fn get_user(params: PathParams) -> Result<Json<User>, Error> {
    let id = params
        .parse::<u64>(0)
        .ok_or_else(|| Error::BadRequest(format!("`{}` is not a user id", &params[0])))?;
    Ok(Json(User { id, name: "alice".to_owned() }))
}

// POST /users
async fn create_user(form: Form) -> Result<Response, Error> {
    let name = form.require("name")?;
    let body = serde_json::to_vec(&User { id: 99, name: name.to_owned() })?;
    Ok(Response::builder()
        .status(http::StatusCode::CREATED)
        .header("location", "/users/99")
        .json(body))
}

// DELETE /users/:id → 204 No Content
async fn delete_user(_params: PathParams) -> http::StatusCode {
    http::StatusCode::NO_CONTENT
}
