//! URL shortener: a controller bound to a route group, CSRF on forms, and a
//! bearer-protected API group.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example shortener
//!
//! Try:
//!   open http://localhost:3000/ and submit a URL
//!   curl -i http://localhost:3000/<code>
//!   curl -H 'authorization: Bearer demo-token' http://localhost:3000/api/user

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kiln::extract::{Form, Query};
use kiln::middleware::{BearerAuth, CsrfToken, csrf_field};
use kiln::{Config, Dispatcher, Error, Json, PathParams, Request, Response, Router, Scope, Server};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::json;

const API_TOKEN: &str = "demo-token";

struct Short {
    long_url: String,
    hits: u64,
}

#[derive(Default)]
struct ShortController {
    shorts: RwLock<HashMap<String, Short>>,
}

impl ShortController {
    async fn index(self: Arc<Self>, req: Request, query: Query) -> String {
        let token = CsrfToken::current(&req).unwrap_or_default();
        let action = req.route("generate", &[]).unwrap_or_default();
        let notice = match (query.get("error"), query.get("url")) {
            (Some(e), _) => format!("<p class=\"error\">{}</p>", escape(e)),
            (None, Some(url)) => format!("<p>Short URL: <a href=\"{0}\">{0}</a></p>", escape(url)),
            _ => String::new(),
        };
        format!(
            "<h1>Shorten a URL</h1>{notice}\
             <form method=\"post\" action=\"{action}\">{}\
             <input name=\"url\" placeholder=\"https://…\"><button>Shorten</button></form>",
            csrf_field(&token),
        )
    }

    async fn generate(self: Arc<Self>, req: Request, form: Form) -> Result<Response, Error> {
        let index = req.route("index", &[]).unwrap_or_else(|| "/".to_owned());
        let url = form.get("url").unwrap_or_default().trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Ok(Response::redirect(&format!("{index}?error=The+url+must+be+a+valid+URL")));
        }

        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        self.shorts
            .write()
            .map_err(|_| Error::internal("short store poisoned"))?
            .insert(code.clone(), Short { long_url: url.to_owned(), hits: 0 });

        let short = req.route("redirect", &[("short", &code)]).unwrap_or_default();
        Ok(Response::redirect(&format!("{index}?url={short}")))
    }

    async fn redirect(self: Arc<Self>, params: PathParams) -> Result<Response, Error> {
        let mut shorts = self
            .shorts
            .write()
            .map_err(|_| Error::internal("short store poisoned"))?;
        let short = shorts.get_mut(&params[0]).ok_or(Error::PageNotFound)?;
        short.hits += 1;
        Ok(Response::redirect(&short.long_url))
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    kiln::logging::init();

    let config = Config::from_toml(
        r#"
        [middleware]
        default = ["trace", "csrf"]
        exclude_prefixes = ["/api"]
        "#,
    )?;

    let router = Router::new()
        .group(Scope::new().controller(Arc::new(ShortController::default())), |r| {
            r.get("/", ShortController::index).name("index")
             .get("/:short", ShortController::redirect).name("redirect")
             .post("/generate", ShortController::generate).name("generate")
        })
        .group(Scope::new().prefix("/api").middleware(["api_auth"]), |r| {
            r.get("/user", |req: Request| async move {
                Json(json!({ "data": { "token": req.token() } }))
            })
        });

    let dispatcher = Dispatcher::new(router, &config)
        .middleware("api_auth", BearerAuth::new(|t: &str| t == API_TOKEN));

    Server::bind(&config.server.bind)?.serve(dispatcher).await
}
