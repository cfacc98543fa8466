//! API v0 endpoints.
//!
//! Version 0 signals an unstable API -- breaking changes are expected
//! until the first stable release.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::oneshot;
use utoipa_axum::{router::OpenApiRouter, routes};

use super::commands::AlarmCommand;
use super::server::SharedState;
use crate::api_client::types::{
    AlarmDraft, AlarmId, AlarmRecord, EnabledPatch, RingStatus, Silenced,
};
use crate::error::{self, Error};
use crate::tracing::prelude::*;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the v0 API routes with OpenAPI metadata.
pub fn routes() -> OpenApiRouter<SharedState> {
    OpenApiRouter::new()
        .routes(routes!(health))
        .routes(routes!(list_alarms, create_alarm))
        .routes(routes!(edit_alarm, delete_alarm, patch_alarm))
        .routes(routes!(get_ringing))
        .routes(routes!(silence))
}

/// Handler failure, rendered as a status code and a short message.
struct ApiError(StatusCode, String);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::AlarmNotFound(_) => StatusCode::NOT_FOUND,
            Error::Silence(_) => StatusCode::CONFLICT,
        };
        Self(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

/// Send a command to the alarm service and wait for its reply.
async fn request<T>(
    state: &SharedState,
    build: impl FnOnce(oneshot::Sender<error::Result<T>>) -> AlarmCommand,
) -> Result<T, ApiError> {
    let (tx, rx) = oneshot::channel();
    state.alarm_cmd_tx.send(build(tx)).await.map_err(|_| {
        ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            "alarm service not running".to_string(),
        )
    })?;

    match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(_)) => Err(ApiError(
            StatusCode::INTERNAL_SERVER_ERROR,
            "alarm service dropped the request".to_string(),
        )),
        Err(_) => {
            warn!("Alarm service did not answer in time");
            Err(ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "alarm service timed out".to_string(),
            ))
        }
    }
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = OK, description = "Server is running", body = String),
    ),
)]
async fn health() -> &'static str {
    "OK"
}

/// Return all alarms, ordered by time.
#[utoipa::path(
    get,
    path = "/alarms",
    tag = "alarms",
    responses(
        (status = OK, description = "All alarms", body = Vec<AlarmRecord>),
    ),
)]
async fn list_alarms(State(state): State<SharedState>) -> Json<Vec<AlarmRecord>> {
    Json(state.alarms())
}

/// Create an alarm. New alarms are enabled and armed.
#[utoipa::path(
    post,
    path = "/alarms",
    tag = "alarms",
    request_body = AlarmDraft,
    responses(
        (status = CREATED, description = "Alarm created", body = AlarmRecord),
        (status = INTERNAL_SERVER_ERROR, description = "Command channel error"),
    ),
)]
async fn create_alarm(
    State(state): State<SharedState>,
    Json(draft): Json<AlarmDraft>,
) -> Result<(StatusCode, Json<AlarmRecord>), ApiError> {
    let record = request(&state, |reply| AlarmCommand::Create { draft, reply }).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Replace an alarm's label and time. Re-arms the alarm.
#[utoipa::path(
    put,
    path = "/alarms/{id}",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    request_body = AlarmDraft,
    responses(
        (status = OK, description = "Updated alarm", body = AlarmRecord),
        (status = NOT_FOUND, description = "Alarm not found"),
    ),
)]
async fn edit_alarm(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(draft): Json<AlarmDraft>,
) -> Result<Json<AlarmRecord>, ApiError> {
    let id = AlarmId::from(id);
    let record = request(&state, |reply| AlarmCommand::Edit { id, draft, reply }).await?;
    Ok(Json(record))
}

/// Delete an alarm.
#[utoipa::path(
    delete,
    path = "/alarms/{id}",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    responses(
        (status = NO_CONTENT, description = "Alarm deleted"),
        (status = NOT_FOUND, description = "Alarm not found"),
    ),
)]
async fn delete_alarm(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = AlarmId::from(id);
    request(&state, |reply| AlarmCommand::Delete { id, reply }).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Enable or disable an alarm. Enabling re-arms it.
#[utoipa::path(
    patch,
    path = "/alarms/{id}",
    tag = "alarms",
    params(
        ("id" = String, Path, description = "Alarm id"),
    ),
    request_body = EnabledPatch,
    responses(
        (status = OK, description = "Updated alarm", body = AlarmRecord),
        (status = NOT_FOUND, description = "Alarm not found"),
    ),
)]
async fn patch_alarm(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(patch): Json<EnabledPatch>,
) -> Result<Json<AlarmRecord>, ApiError> {
    let id = AlarmId::from(id);
    let record = request(&state, |reply| AlarmCommand::SetEnabled {
        id,
        enabled: patch.enabled,
        reply,
    })
    .await?;
    Ok(Json(record))
}

/// Return the ringing session, if any.
#[utoipa::path(
    get,
    path = "/ringing",
    tag = "ringing",
    responses(
        (status = OK, description = "Ring status", body = RingStatus),
    ),
)]
async fn get_ringing(State(state): State<SharedState>) -> Json<RingStatus> {
    Json(state.ring_status())
}

/// Silence the ringing alarm. Allowed only after sustained noise.
#[utoipa::path(
    post,
    path = "/ringing/silence",
    tag = "ringing",
    responses(
        (status = OK, description = "Alarm silenced and disabled", body = Silenced),
        (status = CONFLICT, description = "Nothing ringing, or not enough noise yet"),
    ),
)]
async fn silence(State(state): State<SharedState>) -> Result<Json<Silenced>, ApiError> {
    let alarm_id = request(&state, |reply| AlarmCommand::Silence { reply }).await?;
    Ok(Json(Silenced { alarm_id }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::Request;
    use http_body_util::BodyExt;
    use test_case::test_case;
    use time::macros::datetime;
    use tokio::sync::{mpsc, watch};
    use tower::ServiceExt;

    use super::*;
    use crate::api::router;
    use crate::api_client::types::RingingStatus;
    use crate::ring::SilenceError;
    use crate::service::ServiceChannels;

    #[test_case(Error::AlarmNotFound("alarm_9".into()), StatusCode::NOT_FOUND ; "unknown alarm")]
    #[test_case(SilenceError::NotRinging.into(), StatusCode::CONFLICT ; "nothing ringing")]
    #[test_case(SilenceError::GateClosed.into(), StatusCode::CONFLICT ; "gate still closed")]
    fn every_service_error_has_a_client_status(error: Error, expected: StatusCode) {
        assert_eq!(ApiError::from(error).0, expected);
    }

    fn record(id: &str) -> AlarmRecord {
        AlarmRecord {
            id: AlarmId::from(id),
            label: "Wake up".into(),
            time: datetime!(2026-03-01 07:00 UTC),
            enabled: true,
            triggered: false,
        }
    }

    /// Router backed by a stand-in service that answers every command
    /// with `respond`.
    fn app(
        alarms: Vec<AlarmRecord>,
        ringing: RingStatus,
        respond: impl Fn(AlarmCommand) + Send + 'static,
    ) -> axum::Router {
        let (commands, mut command_rx) = mpsc::channel(4);
        let (_alarms_tx, alarms) = watch::channel(alarms);
        let (_ringing_tx, ringing) = watch::channel(ringing);

        tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                respond(command);
            }
        });

        router(SharedState::from(ServiceChannels {
            commands,
            alarms,
            ringing,
        }))
    }

    fn idle_app(respond: impl Fn(AlarmCommand) + Send + 'static) -> axum::Router {
        app(Vec::new(), RingStatus::default(), respond)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = idle_app(|_| {})
            .oneshot(empty_request("GET", "/api/v0/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn list_uses_wire_field_names() {
        let response = app(vec![record("a1")], RingStatus::default(), |_| {})
            .oneshot(empty_request("GET", "/api/v0/alarms"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body[0]["id"], "a1");
        assert_eq!(body[0]["time"], "2026-03-01T07:00:00Z");
        assert_eq!(body[0]["isEnabled"], true);
        assert_eq!(body[0]["isTriggered"], false);
    }

    #[tokio::test]
    async fn create_returns_created_record() {
        let app = idle_app(|command| {
            if let AlarmCommand::Create { draft, reply } = command {
                let _ = reply.send(Ok(AlarmRecord::new(AlarmId::from("alarm_1"), draft)));
            }
        });

        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v0/alarms",
                serde_json::json!({ "label": "gym", "time": "2026-03-01T06:30:00+01:00" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: AlarmRecord = body_json(response).await;
        assert_eq!(created.label, "gym");
        assert_eq!(created.time, datetime!(2026-03-01 06:30 +01:00));
        assert!(created.enabled);
    }

    #[tokio::test]
    async fn create_rejects_malformed_time() {
        let response = idle_app(|_| {})
            .oneshot(json_request(
                "POST",
                "/api/v0/alarms",
                serde_json::json!({ "label": "gym", "time": "tomorrow" }),
            ))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn edit_of_unknown_alarm_is_not_found() {
        let app = idle_app(|command| {
            if let AlarmCommand::Edit { id, reply, .. } = command {
                let _ = reply.send(Err(Error::AlarmNotFound(id)));
            }
        });

        let response = app
            .oneshot(json_request(
                "PUT",
                "/api/v0/alarms/ghost",
                serde_json::json!({ "label": "x", "time": "2026-03-01T06:30:00Z" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_returns_no_content() {
        let app = idle_app(|command| {
            if let AlarmCommand::Delete { reply, .. } = command {
                let _ = reply.send(Ok(()));
            }
        });

        let response = app
            .oneshot(empty_request("DELETE", "/api/v0/alarms/a1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn patch_forwards_enabled_flag() {
        let app = idle_app(|command| {
            if let AlarmCommand::SetEnabled { id, enabled, reply } = command {
                let mut alarm = record(id.as_str());
                alarm.enabled = enabled;
                let _ = reply.send(Ok(alarm));
            }
        });

        let response = app
            .oneshot(json_request(
                "PATCH",
                "/api/v0/alarms/a1",
                serde_json::json!({ "enabled": false }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let updated: AlarmRecord = body_json(response).await;
        assert_eq!(updated.id.as_str(), "a1");
        assert!(!updated.enabled);
    }

    #[tokio::test]
    async fn ringing_reports_session() {
        let status = RingStatus {
            ringing: Some(RingingStatus {
                alarm_id: AlarmId::from("a1"),
                label: "Wake up".into(),
                remaining_secs: 3,
                progress: 0.4,
                silence_enabled: false,
                alert: None,
            }),
        };

        let response = app(Vec::new(), status.clone(), |_| {})
            .oneshot(empty_request("GET", "/api/v0/ringing"))
            .await
            .unwrap();

        let body: RingStatus = body_json(response).await;
        assert_eq!(body, status);
    }

    #[tokio::test]
    async fn silence_with_gate_closed_conflicts() {
        let app = idle_app(|command| {
            if let AlarmCommand::Silence { reply } = command {
                let _ = reply.send(Err(SilenceError::GateClosed.into()));
            }
        });

        let response = app
            .oneshot(empty_request("POST", "/api/v0/ringing/silence"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn silence_returns_alarm_id() {
        let app = idle_app(|command| {
            if let AlarmCommand::Silence { reply } = command {
                let _ = reply.send(Ok(AlarmId::from("a1")));
            }
        });

        let response = app
            .oneshot(empty_request("POST", "/api/v0/ringing/silence"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Silenced = body_json(response).await;
        assert_eq!(body.alarm_id, AlarmId::from("a1"));
    }

    #[tokio::test]
    async fn dropped_reply_is_server_error() {
        let response = idle_app(drop)
            .oneshot(empty_request("POST", "/api/v0/ringing/silence"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn openapi_document_lists_alarm_paths() {
        let response = idle_app(|_| {})
            .oneshot(empty_request("GET", "/api/openapi.json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let doc: serde_json::Value = body_json(response).await;
        assert!(doc["paths"]["/api/v0/alarms"].is_object());
        assert!(doc["paths"]["/api/v0/ringing/silence"].is_object());
    }
}
