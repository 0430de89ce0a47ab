/// API Key Authentication Middleware
///
/// Validates the `x-api-key` header against the configured key set and,
/// when valid, stamps the request extensions with `ApiKey` so downstream
/// middleware (the rate limiter's per-key tier) can trust it without
/// re-validating. Unlike the teacher's `ApiKeyAuth`, a missing or invalid
/// key is not rejected here — this engine's API is public by default;
/// an API key only unlocks the higher rate-limit tier.
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::collections::HashSet;
use std::future::{ready, Ready};
use std::sync::Arc;

/// Validated API key stored in request extensions.
#[derive(Clone)]
pub struct ApiKey(pub String);

#[derive(Clone)]
pub struct ApiKeyAuth {
    valid_keys: Arc<HashSet<String>>,
}

impl ApiKeyAuth {
    pub fn new(api_keys: Vec<String>) -> Self {
        Self {
            valid_keys: Arc::new(api_keys.into_iter().collect()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service,
            valid_keys: self.valid_keys.clone(),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: S,
    valid_keys: Arc<HashSet<String>>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let header_key = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if let Some(key) = header_key {
            if self.valid_keys.contains(&key) {
                req.extensions_mut().insert(ApiKey(key));
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    async fn echo_extension(req: actix_web::HttpRequest) -> HttpResponse {
        match req.extensions().get::<ApiKey>() {
            Some(k) => HttpResponse::Ok().body(k.0.clone()),
            None => HttpResponse::Ok().body("anonymous"),
        }
    }

    #[actix_web::test]
    async fn valid_key_is_stamped_into_extensions() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new(vec!["good-key".to_string()]))
                .route("/", web::get().to(echo_extension)),
        )
        .await;
        let req = test::TestRequest::get().uri("/").insert_header(("x-api-key", "good-key")).to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "good-key");
    }

    #[actix_web::test]
    async fn unrecognized_key_is_not_stamped() {
        let app = test::init_service(
            App::new()
                .wrap(ApiKeyAuth::new(vec!["good-key".to_string()]))
                .route("/", web::get().to(echo_extension)),
        )
        .await;
        let req = test::TestRequest::get().uri("/").insert_header(("x-api-key", "spoofed")).to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "anonymous");
    }
}
