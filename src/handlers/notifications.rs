// src/handlers/notifications.rs
// DOCUMENTATION: Notification inbox and live stream (Server-Sent Events)
// PURPOSE: Clients keep one stream open and reload the inbox when it reconnects

use crate::errors::CrmError;
use crate::handlers::auth::Actor;
use crate::models::{CreateNotificationRequest, Notification, NotificationQuery, StreamQuery};
use crate::services::{EventPublisher, NotificationService};
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use sqlx::PgPool;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

const KEEP_ALIVE_SECS: u64 = 15;

#[derive(Debug, Serialize)]
struct MarkedRead {
    recipient: String,
    updated: u64,
}

/// GET /api/v1/notifications?recipient=&unread_only=
/// Defaults to the caller's inbox
pub async fn list_notifications(
    actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<NotificationQuery>,
) -> Result<impl Responder, CrmError> {
    let query = query.into_inner();
    let recipient = query.recipient.clone().unwrap_or(actor.name);
    let result = NotificationService::list(pool.get_ref(), &recipient, query).await?;
    Ok(HttpResponse::Ok().json(result))
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(
    actor: Actor,
    pool: web::Data<PgPool>,
    query: web::Query<StreamQuery>,
) -> Result<impl Responder, CrmError> {
    let recipient = query.into_inner().recipient.unwrap_or(actor.name);
    let count = NotificationService::unread_count(pool.get_ref(), &recipient).await?;
    Ok(HttpResponse::Ok().json(count))
}

/// POST /api/v1/notifications
/// Manual notification; `recipient: "all"` reaches every stream
pub async fn create_notification(
    _actor: Actor,
    publisher: web::Data<EventPublisher>,
    body: web::Json<CreateNotificationRequest>,
) -> Result<impl Responder, CrmError> {
    let notification = NotificationService::create(publisher.get_ref(), body.into_inner()).await?;
    Ok(HttpResponse::Created().json(notification))
}

/// POST /api/v1/notifications/{id}/read
pub async fn mark_read(
    _actor: Actor,
    pool: web::Data<PgPool>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, CrmError> {
    let notification = NotificationService::mark_read(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(notification))
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(actor: Actor, pool: web::Data<PgPool>) -> Result<impl Responder, CrmError> {
    let updated = NotificationService::mark_all_read(pool.get_ref(), &actor.name).await?;
    Ok(HttpResponse::Ok().json(MarkedRead {
        recipient: actor.name,
        updated,
    }))
}

/// GET /api/v1/notifications/stream?recipient=
/// DOCUMENTATION: text/event-stream of `notification` events for the recipient and `all`,
/// with a comment line every 15s so proxies keep the connection open
pub async fn stream(
    actor: Actor,
    publisher: web::Data<EventPublisher>,
    query: web::Query<StreamQuery>,
) -> impl Responder {
    let recipient = query.into_inner().recipient.unwrap_or(actor.name);
    log::info!(
        "Notification stream opened for {} ({} live)",
        recipient,
        publisher.hub().subscriber_count() + 1
    );

    let events = notification_events(publisher.hub().subscribe(), recipient);
    let keep_alive = IntervalStream::new(tokio::time::interval(Duration::from_secs(KEEP_ALIVE_SECS)))
        .map(|_| web::Bytes::from_static(b": keep-alive\n\n"));

    let body = tokio_stream::once(web::Bytes::from_static(b": connected\n\n"))
        .chain(events.merge(keep_alive))
        .map(Ok::<_, Infallible>);

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body)
}

/// SSE frames for one recipient
/// DOCUMENTATION: lagged receivers log how much they missed and keep streaming
pub fn notification_events(
    rx: broadcast::Receiver<Notification>,
    recipient: String,
) -> impl Stream<Item = web::Bytes> {
    BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(notification) if notification.is_visible_to(&recipient) => sse_frame(&notification),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            log::warn!("Notification stream for {} lagged, skipped {} message(s)", recipient, missed);
            None
        }
    })
}

fn sse_frame(notification: &Notification) -> Option<web::Bytes> {
    match serde_json::to_string(notification) {
        Ok(data) => Some(web::Bytes::from(format!(
            "event: notification\nid: {}\ndata: {}\n\n",
            notification.id, data
        ))),
        Err(e) => {
            log::error!("Could not serialize notification {}: {}", notification.id, e);
            None
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .route("", web::get().to(list_notifications))
            .route("", web::post().to(create_notification))
            .route("/unread-count", web::get().to(unread_count))
            .route("/stream", web::get().to(stream))
            .route("/read-all", web::post().to(mark_all_read))
            .route("/{id}/read", web::post().to(mark_read)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{api_request, test_state};
    use crate::models::{NotificationKind, BROADCAST_RECIPIENT};
    use crate::services::NotificationHub;
    use actix_web::{http::StatusCode, test, App};
    use chrono::Utc;

    fn notification(recipient: &str, title: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            kind: NotificationKind::System,
            title: title.to_string(),
            message: None,
            link: None,
            resource_type: None,
            resource_id: None,
            is_read: false,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    fn frame_text(bytes: &web::Bytes) -> String {
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_filters_on_recipient() {
        let hub = NotificationHub::new(16);
        let rx = hub.subscribe();

        hub.publish(notification("alice", "for alice"));
        hub.publish(notification("bob", "for bob"));
        hub.publish(notification(BROADCAST_RECIPIENT, "for everyone"));
        drop(hub);

        let frames: Vec<String> = notification_events(rx, "alice".to_string())
            .map(|b| frame_text(&b))
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert!(frames[0].starts_with("event: notification\n"));
        assert!(frames[0].contains("for alice"));
        assert!(frames[1].contains("for everyone"));
        assert!(frames.iter().all(|f| f.ends_with("\n\n")));
    }

    #[tokio::test]
    async fn test_lagged_stream_keeps_going() {
        let hub = NotificationHub::new(1);
        let rx = hub.subscribe();

        hub.publish(notification("alice", "first"));
        hub.publish(notification("alice", "second"));
        hub.publish(notification("alice", "third"));
        drop(hub);

        let frames: Vec<String> = notification_events(rx, "alice".to_string())
            .map(|b| frame_text(&b))
            .collect()
            .await;

        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("third"));
    }

    #[actix_rt::test]
    async fn test_stream_endpoint_requires_token() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = test::TestRequest::get().uri("/notifications/stream").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn test_stream_endpoint_content_type() {
        let state = test_state();
        let app = test::init_service(App::new().configure(|c| state.register(c)).configure(config)).await;

        let req = api_request(test::TestRequest::get().uri("/notifications/stream?recipient=alice")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
    }
}
