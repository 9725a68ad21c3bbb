// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for annotation-webhook.
//!
//! These tests run without a Kubernetes cluster. The decision pipeline is
//! exercised directly, and the transport through the axum router.
//!
//! ```bash
//! cargo test --test unit
//! ```

#[path = "../common/mod.rs"]
mod common;

mod decision_tests {
    use annotation_webhook::webhooks::policies::{
        DECODE_FAILURE_MESSAGE, DecisionReason, RequiredAnnotations, UNSUPPORTED_KIND_MESSAGE,
        ValidationContext, WorkloadKind, decide,
    };

    use crate::common::fixtures::{WorkloadBuilder, recommended_annotations};

    fn run(kind: &str, namespace: &str, raw: &str) -> annotation_webhook::Decision {
        decide(
            &ValidationContext {
                kind,
                namespace,
                object: raw.as_bytes(),
            },
            &RequiredAnnotations::recommended(),
        )
    }

    #[test]
    fn test_every_kind_allowed_with_required_annotations() {
        for kind in WorkloadKind::ALL {
            let raw = WorkloadBuilder::new(kind)
                .namespace("apps")
                .annotations(recommended_annotations())
                .build_json();

            let decision = run(kind.as_str(), "apps", &raw);
            assert!(decision.allowed, "{kind}: {}", decision.message);
            assert_eq!(decision.message, "", "{kind}");
        }
    }

    #[test]
    fn test_every_kind_denied_listing_exactly_the_missing_key() {
        for kind in WorkloadKind::ALL {
            let raw = WorkloadBuilder::new(kind)
                .annotation("app.kubernetes.io/name", "hello")
                .build_json();

            let decision = run(kind.as_str(), "apps", &raw);
            assert!(!decision.allowed, "{kind}");
            assert_eq!(decision.reason, DecisionReason::MissingAnnotations);
            assert_eq!(
                decision.message,
                "the submitted Pods are missing required annotations: \
                 {app.kubernetes.io/component: key was not found}",
                "{kind}"
            );
        }
    }

    #[test]
    fn test_controller_annotations_do_not_count() {
        let mut builder = WorkloadBuilder::new(WorkloadKind::Deployment);
        for (k, v) in recommended_annotations() {
            builder = builder.owner_annotation(k, v);
        }

        let decision = run("Deployment", "apps", &builder.build_json());
        assert!(!decision.allowed);
        assert!(decision.message.contains("app.kubernetes.io/name: key was not found"));
        assert!(decision.message.contains("app.kubernetes.io/component: key was not found"));
    }

    #[test]
    fn test_both_missing_keys_are_named() {
        let raw = WorkloadBuilder::new(WorkloadKind::Pod).build_json();
        let decision = run("Pod", "default", &raw);
        assert!(!decision.allowed);
        assert!(decision.message.contains("app.kubernetes.io/name"));
        assert!(decision.message.contains("app.kubernetes.io/component"));
    }

    #[test]
    fn test_rejected_value_is_reported() {
        let table = RequiredAnnotations::parse(
            "app.kubernetes.io/name,app.kubernetes.io/component=frontend|backend",
        )
        .unwrap();
        let raw = WorkloadBuilder::new(WorkloadKind::Pod)
            .annotation("app.kubernetes.io/name", "hello")
            .annotation("app.kubernetes.io/component", "database")
            .build_json();

        let decision = decide(
            &ValidationContext {
                kind: "Pod",
                namespace: "default",
                object: raw.as_bytes(),
            },
            &table,
        );
        assert!(!decision.allowed);
        assert!(
            decision
                .message
                .ends_with("{app.kubernetes.io/component: value did not match}")
        );
    }

    #[test]
    fn test_unknown_kind_denied_regardless_of_body() {
        let raw = WorkloadBuilder::new(WorkloadKind::Pod)
            .annotations(recommended_annotations())
            .build_json();
        for body in [raw.as_str(), "", "]]"] {
            let decision = run("ConfigMap", "default", body);
            assert!(!decision.allowed);
            assert_eq!(decision.message, UNSUPPORTED_KIND_MESSAGE);
        }
    }

    #[test]
    fn test_malformed_object_is_generic_decode_failure() {
        for kind in WorkloadKind::ALL {
            let decision = run(kind.as_str(), "default", r#"{"metadata": "oops"}"#);
            assert!(!decision.allowed, "{kind}");
            assert_eq!(decision.message, DECODE_FAILURE_MESSAGE, "{kind}");
        }
    }

    #[test]
    fn test_system_namespaces_always_allowed() {
        for ns in ["kube-system", "kube-public"] {
            for kind in ["Pod", "ConfigMap", "Deployment"] {
                let decision = run(kind, ns, "not json at all");
                assert!(decision.allowed, "{kind} in {ns}");
                assert!(decision.message.contains(ns));
            }
        }
    }
}

mod transport_tests {
    use std::sync::Arc;

    use annotation_webhook::webhooks::policies::{
        DECODE_FAILURE_MESSAGE, RequiredAnnotations, UNSUPPORTED_KIND_MESSAGE, WorkloadKind,
    };
    use annotation_webhook::webhooks::{JSON_CONTENT_TYPE, WebhookState, create_webhook_router};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::common::fixtures::{WorkloadBuilder, recommended_annotations, review_body};

    fn router() -> Router {
        let state = WebhookState::new(RequiredAnnotations::recommended(), 3 * 1024 * 1024);
        create_webhook_router(Arc::new(state), "/validate")
    }

    async fn call(
        method: Method,
        content_type: Option<&str>,
        body: String,
    ) -> (StatusCode, Option<String>, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri("/validate");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let response = router()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, content_type, body)
    }

    async fn post_review(body: String) -> (StatusCode, Value) {
        let (status, content_type, body) =
            call(Method::POST, Some(JSON_CONTENT_TYPE), body).await;
        assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));
        assert_eq!(content_type.as_deref(), Some(JSON_CONTENT_TYPE));
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_non_post_is_method_not_allowed() {
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            let body = review_body("u", "Pod", "default", "{}");
            let (status, _, body) = call(method.clone(), Some(JSON_CONTENT_TYPE), body).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");

            let text = String::from_utf8(body).unwrap();
            assert!(text.contains("only POST requests are allowed"), "{text}");
            assert!(serde_json::from_str::<Value>(&text).is_err());
        }
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_bad_request() {
        let body = review_body("u", "Pod", "default", "{}");
        let (status, _, text) = call(Method::POST, Some("text/plain"), body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8(text).unwrap().contains("unsupported content type"));

        let (status, _, _) = call(Method::POST, None, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_undecodable_envelope_is_bad_request() {
        for body in ["{", "[1,2]", r#"{"request": {"kind": {"kind": "Pod"}}}"#] {
            let (status, _, text) =
                call(Method::POST, Some(JSON_CONTENT_TYPE), body.to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert!(String::from_utf8(text).unwrap().starts_with("could not deserialize request"));
        }
    }

    #[tokio::test]
    async fn test_missing_request_section_is_bad_request() {
        for body in [
            r#"{"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"}"#,
            r#"{"request": null}"#,
        ] {
            let (status, _, text) =
                call(Method::POST, Some(JSON_CONTENT_TYPE), body.to_string()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(
                String::from_utf8(text).unwrap(),
                "malformed admission review: request is missing"
            );
        }
    }

    #[tokio::test]
    async fn test_uid_is_echoed() {
        let object = WorkloadBuilder::new(WorkloadKind::Pod)
            .annotations(recommended_annotations())
            .build_json();
        let (_, review) = post_review(review_body("abc-123", "Pod", "default", &object)).await;

        assert_eq!(review["apiVersion"], "admission.k8s.io/v1");
        assert_eq!(review["kind"], "AdmissionReview");
        assert_eq!(review["response"]["uid"], "abc-123");
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(review["response"]["status"]["message"], "");
    }

    #[tokio::test]
    async fn test_denial_is_http_success() {
        let object = WorkloadBuilder::new(WorkloadKind::StatefulSet)
            .annotation("app.kubernetes.io/component", "db")
            .build_json();
        let (_, review) = post_review(review_body("d-1", "StatefulSet", "apps", &object)).await;

        assert_eq!(review["response"]["uid"], "d-1");
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(
            review["response"]["status"]["message"],
            "the submitted Pods are missing required annotations: \
             {app.kubernetes.io/name: key was not found}"
        );
        assert_eq!(review["response"]["status"]["reason"], "MissingAnnotations");
    }

    #[tokio::test]
    async fn test_malformed_object_is_denied_not_rejected() {
        let body = review_body("m-1", "Deployment", "apps", r#"{"spec": {"template": 5}}"#);
        let (_, review) = post_review(body).await;
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["status"]["message"], DECODE_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_missing_object_is_decode_failure() {
        let body =
            r#"{"request": {"uid": "n-1", "kind": {"kind": "Pod"}, "namespace": "default"}}"#;
        let (_, review) = post_review(body.to_string()).await;
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["status"]["message"], DECODE_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_unsupported_kind_is_denied() {
        let body = review_body("c-1", "ConfigMap", "default", r#"{"data": {"a": "b"}}"#);
        let (_, review) = post_review(body).await;
        assert_eq!(review["response"]["allowed"], false);
        assert_eq!(review["response"]["status"]["message"], UNSUPPORTED_KIND_MESSAGE);
    }

    #[tokio::test]
    async fn test_exempt_namespace_is_allowed() {
        let body = review_body("s-1", "DaemonSet", "kube-system", r#"{"spec": 1}"#);
        let (_, review) = post_review(body).await;
        assert_eq!(review["response"]["allowed"], true);
        assert_eq!(
            review["response"]["status"]["message"],
            "allowing admission: kube-system namespace is exempt"
        );
    }

    #[tokio::test]
    async fn test_v1beta1_api_version_is_echoed() {
        let body = r#"{
            "apiVersion": "admission.k8s.io/v1beta1",
            "kind": "AdmissionReview",
            "request": {"uid": "b-1", "kind": {"kind": "Pod"}, "namespace": "kube-public"}
        }"#;
        let (_, review) = post_review(body.to_string()).await;
        assert_eq!(review["apiVersion"], "admission.k8s.io/v1beta1");
        assert_eq!(review["response"]["uid"], "b-1");
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let app = router();
        let mut handles = Vec::new();
        for i in 0..16 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                let mut builder = WorkloadBuilder::new(WorkloadKind::Pod);
                if i % 2 == 0 {
                    builder = builder.annotations(recommended_annotations());
                }
                let uid = format!("uid-{i}");
                let request = Request::builder()
                    .method(Method::POST)
                    .uri("/validate")
                    .header(header::CONTENT_TYPE, JSON_CONTENT_TYPE)
                    .body(Body::from(review_body(&uid, "Pod", "default", &builder.build_json())))
                    .unwrap();
                let response = app.oneshot(request).await.unwrap();
                let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                    .await
                    .unwrap();
                let review: Value = serde_json::from_slice(&body).unwrap();
                (i, review)
            }));
        }

        for handle in handles {
            let (i, review) = handle.await.unwrap();
            assert_eq!(review["response"]["uid"], format!("uid-{i}"));
            assert_eq!(review["response"]["allowed"], i % 2 == 0);
        }
    }
}

mod config_tests {
    use annotation_webhook::{ConfigError, WebhookConfig};

    #[test]
    fn test_required_annotations_from_environment_lookup() {
        let config = WebhookConfig::from_lookup(|name| match name {
            "REQUIRED_ANNOTATIONS" => Some("team, tier=frontend|backend".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(
            config.required_annotations.keys().collect::<Vec<_>>(),
            vec!["team", "tier"]
        );
    }

    #[test]
    fn test_invalid_pattern_aborts_startup() {
        let result = WebhookConfig::from_lookup(|name| match name {
            "REQUIRED_ANNOTATIONS" => Some("tier=(".to_string()),
            _ => None,
        });
        assert!(matches!(result, Err(ConfigError::InvalidAnnotation { .. })));
    }
}
