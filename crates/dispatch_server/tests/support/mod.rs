#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use dispatch_core::config::DispatchConfig;
use dispatch_core::eta::StraightLineProvider;
use dispatch_core::model::RequesterId;
use dispatch_core::test_helpers::{requester, test_engine, TestEngine};
use dispatch_server::identity::{REQUESTER_ID_HEADER, REQUESTER_ROLE_HEADER};
use dispatch_server::router::build_router;
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub engine: TestEngine,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default().with_dispatch_threshold(2))
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        let routing = Arc::new(StraightLineProvider::new(40.0).expect("valid speed"));
        let engine = test_engine(config, routing);
        let router = build_router(engine.service.clone());
        Self { router, engine }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }
}

/// Who is calling, as forwarded by the gateway.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub id: RequesterId,
    pub role: &'static str,
}

pub fn passenger(n: u128) -> Caller {
    Caller {
        id: requester(n),
        role: "PASSENGER",
    }
}

pub fn driver(n: u128) -> Caller {
    Caller {
        id: requester(500 + n),
        role: "DRIVER",
    }
}

pub fn admin() -> Caller {
    Caller {
        id: requester(900),
        role: "ADMIN",
    }
}

pub fn request(method: Method, path: &str, caller: Option<Caller>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(caller) = caller {
        builder = builder
            .header(REQUESTER_ID_HEADER, caller.id.to_string())
            .header(REQUESTER_ROLE_HEADER, caller.role);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request should build")
}

pub fn get(path: &str, caller: Caller) -> Request<Body> {
    request(Method::GET, path, Some(caller), None)
}

pub fn post(path: &str, caller: Caller, body: Value) -> Request<Body> {
    request(Method::POST, path, Some(caller), Some(body))
}
