//! Handlers for the Reserves API.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};

use crate::AppState;
use crate::api::models::reserves::{CreateReserve, ExpiredFeedQuery};
use crate::errors::{Error, Result};
use crate::reserve::{Reservation, ReserveExpired, ReserveId};

fn parse_reserve_id(raw: &str) -> Result<ReserveId> {
    raw.parse().map_err(|_| Error::BadRequest {
        message: format!("Invalid reservation ID: {raw}"),
    })
}

/// Create a reservation.
///
/// POST /api/v1/reserves
pub async fn create_reserve(
    State(state): State<AppState>,
    Json(payload): Json<CreateReserve>,
) -> Result<(StatusCode, Json<Reservation>)> {
    let reservation = state.manager.create_reserve(
        payload.context_id.unwrap_or_default(),
        payload.activity_sp_id.unwrap_or_default(),
        payload.quantity.unwrap_or_default(),
    )?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// List all active reservations.
///
/// GET /api/v1/reserves
pub async fn list_reserves(State(state): State<AppState>) -> Json<Vec<Reservation>> {
    Json(state.manager.list_reserves())
}

/// Fetch a single active reservation.
///
/// GET /api/v1/reserves/{reserve_id}
pub async fn get_reserve(State(state): State<AppState>, Path(reserve_id): Path<String>) -> Result<Json<Reservation>> {
    let reserve_id = parse_reserve_id(&reserve_id)?;
    Ok(Json(state.manager.get_reserve(&reserve_id)?))
}

/// Commit a reservation before it expires.
///
/// POST /api/v1/reserves/{reserve_id}/commit
///
/// Responds 404 when there is nothing to commit.
pub async fn commit_reserve(State(state): State<AppState>, Path(reserve_id): Path<String>) -> Result<Json<Reservation>> {
    let reserve_id = parse_reserve_id(&reserve_id)?;
    Ok(Json(state.manager.commit_reserve(&reserve_id)?))
}

fn to_sse_event(expired: &ReserveExpired) -> Option<Event> {
    match Event::default().event("reserve_expired").json_data(expired) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!(reserve_id = %expired.reserve_id, "Failed to encode expiry event: {}", e);
            None
        }
    }
}

/// Stream expiries for one context as Server-Sent Events.
///
/// GET /api/v1/reserves/expired?context_id=..
pub async fn stream_expired(
    State(state): State<AppState>,
    Query(query): Query<ExpiredFeedQuery>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    tracing::debug!(context_id = %query.context_id, "Expiry feed subscribed");

    let events = state
        .manager
        .subscribe_expiry(query.context_id)
        .filter_map(|expired| futures::future::ready(to_sse_event(&expired).map(Ok)));

    Sse::new(events).keep_alive(KeepAlive::new().interval(state.config.notifications.keep_alive))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::errors::ErrorBody;
    use crate::reserve::ReserveStatus;
    use crate::test_utils::{create_test_server, spawn_http_server};

    /// Read an open event stream until `needle` shows up, returning everything read so far.
    async fn read_feed_until(feed: &mut reqwest::Response, needle: &str) -> String {
        let mut received = String::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !received.contains(needle) {
                let chunk = feed.chunk().await.expect("feed read failed").expect("feed closed");
                received.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{needle} not streamed, got: {received}"));
        received
    }

    async fn open_feed(url: String) -> reqwest::Response {
        let feed = reqwest::Client::new().get(url).send().await.unwrap();
        assert_eq!(feed.status(), reqwest::StatusCode::OK);
        let content_type = feed.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));
        feed
    }

    #[test_log::test(tokio::test)]
    async fn test_create_and_commit_reserve() {
        let (server, _state) = create_test_server(Duration::from_secs(600));

        let response = server
            .post("/api/v1/reserves")
            .json(&json!({ "context_id": "c1", "activity_sp_id": 101, "quantity": 1 }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Reservation = response.json();
        assert_eq!(created.status, ReserveStatus::Active);

        let response = server
            .post(&format!("/api/v1/reserves/{}/commit", created.reserve_id))
            .await;
        response.assert_status_ok();
        let committed: Reservation = response.json();
        assert_eq!(committed.reserve_id, created.reserve_id);
        assert_eq!(committed.context_id, "c1");
        assert_eq!(committed.activity_sp_id, 101);
        assert_eq!(committed.quantity, 1);
        assert_eq!(committed.status, ReserveStatus::Committed);
    }

    #[test_log::test(tokio::test)]
    async fn test_commit_twice_returns_not_found() {
        let (server, _state) = create_test_server(Duration::from_secs(600));

        let created: Reservation = server
            .post("/api/v1/reserves")
            .json(&json!({ "context_id": "c1", "activity_sp_id": 101, "quantity": 1 }))
            .await
            .json();

        let path = format!("/api/v1/reserves/{}/commit", created.reserve_id);
        server.post(&path).await.assert_status_ok();

        let response = server.post(&path).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: ErrorBody = response.json();
        assert!(body.message.contains("No active reservation"));
    }

    #[test_log::test(tokio::test)]
    async fn test_commit_malformed_id_is_bad_request() {
        let (server, _state) = create_test_server(Duration::from_secs(600));

        let response = server.post("/api/v1/reserves/not-a-uuid/commit").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[test_log::test(tokio::test)]
    async fn test_create_tolerates_missing_fields() {
        let (server, _state) = create_test_server(Duration::from_secs(600));

        let response = server.post("/api/v1/reserves").json(&json!({})).await;
        response.assert_status(StatusCode::CREATED);
        let created: Reservation = response.json();
        assert_eq!(created.context_id, "");
        assert_eq!(created.activity_sp_id, 0);
        assert_eq!(created.quantity, 0);

        let response = server
            .post("/api/v1/reserves")
            .json(&json!({ "context_id": null, "activity_sp_id": 101, "quantity": null }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Reservation = response.json();
        assert_eq!(created.context_id, "");
        assert_eq!(created.activity_sp_id, 101);
        assert_eq!(created.quantity, 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_list_and_get_reserves() {
        let (server, _state) = create_test_server(Duration::from_secs(600));

        let listed: Vec<Reservation> = server.get("/api/v1/reserves").await.json();
        assert!(listed.is_empty());

        let created: Reservation = server
            .post("/api/v1/reserves")
            .json(&json!({ "context_id": "c1", "activity_sp_id": 7, "quantity": 2 }))
            .await
            .json();

        let listed: Vec<Reservation> = server.get("/api/v1/reserves").await.json();
        assert_eq!(listed, vec![created.clone()]);

        let fetched: Reservation = server
            .get(&format!("/api/v1/reserves/{}", created.reserve_id))
            .await
            .json();
        assert_eq!(fetched, created);

        server
            .get(&format!("/api/v1/reserves/{}", ReserveId::new()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_expired_reservation_cannot_be_committed() {
        let (server, state) = create_test_server(Duration::from_millis(20));
        let mut feed = Box::pin(state.manager.subscribe_expiry("c1"));

        let created: Reservation = server
            .post("/api/v1/reserves")
            .json(&json!({ "context_id": "c1", "activity_sp_id": 101, "quantity": 1 }))
            .await
            .json();

        let expired = tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .expect("expiry should be published")
            .expect("feed should stay open");
        assert_eq!(expired.reserve_id, created.reserve_id);

        server
            .post(&format!("/api/v1/reserves/{}/commit", created.reserve_id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[test_log::test(tokio::test)]
    async fn test_expired_feed_streams_only_requested_context() {
        let (addr, state) = spawn_http_server(Duration::from_millis(50)).await;
        let mut feed = open_feed(format!("http://{addr}/api/v1/reserves/expired?context_id=c1")).await;

        // Let the c2 reservation expire completely before the c1 one is created.
        let other = state.manager.create_reserve("c2".to_string(), 202, 1).unwrap();
        while state.manager.get_reserve(&other.reserve_id).is_ok() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let ours = state.manager.create_reserve("c1".to_string(), 101, 1).unwrap();

        let received = read_feed_until(&mut feed, &ours.reserve_id.to_string()).await;
        assert!(received.contains("event: reserve_expired"));
        assert!(received.contains(r#""context_id":"c1""#));
        assert!(!received.contains(&other.reserve_id.to_string()));
    }

    #[test_log::test(tokio::test)]
    async fn test_expired_feed_without_context_follows_empty_context() {
        let (addr, state) = spawn_http_server(Duration::from_millis(50)).await;
        let mut feed = open_feed(format!("http://{addr}/api/v1/reserves/expired")).await;

        let named = state.manager.create_reserve("c1".to_string(), 101, 1).unwrap();
        let unnamed = state.manager.create_reserve(String::new(), 0, 0).unwrap();

        let received = read_feed_until(&mut feed, &unnamed.reserve_id.to_string()).await;
        assert!(!received.contains(&named.reserve_id.to_string()));
    }

    #[test]
    fn test_sse_event_encoding() {
        let expired = ReserveExpired {
            context_id: "c1".to_string(),
            reserve_id: ReserveId::new(),
            activity_sp_id: 101,
            quantity: 1,
            expired_at: Utc::now(),
        };

        assert!(to_sse_event(&expired).is_some());
    }
}
