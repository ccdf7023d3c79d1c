use actix_web::{test, web, App};
use oracle_backend::{build_state, routes, AppError};

#[actix_web::test]
async fn health_reports_instance_and_sessions() -> Result<(), AppError> {
    let state = build_state().with_instance_id("health-node").build().await?;
    let _attached = state.router.connect("observer");

    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["instance_id"], "health-node");
    assert_eq!(body["sessions"], 1);
    assert!(body["time"].as_str().is_some_and(|t| !t.is_empty()));
    Ok(())
}
