use actix_web::{test, web, App};
use peer_relay::relay::{ClientEvent, ConnectionId, RegisterPayload};
use peer_relay::websocket::{Connect, Inbound};
use peer_relay::{routes, AppState, Settings};

#[actix_web::test]
async fn test_health_check() {
    let state = AppState::new(Settings::new_for_test().expect("Failed to load test config"));

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    ).await;

    // Send request
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    // Assert response
    assert!(resp.status().is_success());

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["users"], 0);
    assert_eq!(json["groups"], 0);
}

#[actix_web::test]
async fn test_health_check_reports_live_state() {
    let state = AppState::new(Settings::new_for_test().unwrap());

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let conn = ConnectionId::new();
    state.hub.do_send(Connect { id: conn, sender: tx });
    state.hub.do_send(Inbound {
        id: conn,
        event: ClientEvent::RegisterUser(RegisterPayload::Bare("u1".into())),
    });
    state.hub.do_send(Inbound {
        id: conn,
        event: ClientEvent::JoinPeerGroup {
            group_id: "peer1".into(),
            user_id: "u1".into(),
            user_name: None,
        },
    });

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes)
    ).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(json["users"], 1);
    assert_eq!(json["groups"], 1);
}

#[actix_web::test]
async fn test_unknown_route_is_not_found() {
    let state = AppState::new(Settings::new_for_test().unwrap());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes)
    ).await;

    let req = test::TestRequest::get().uri("/status").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}
