//! The container-facing HTTP surface: `POST /invocations` runs the same
//! transform as the serverless entry point, `GET /ping` answers once the
//! process is up (the model loads before the server binds).

use std::sync::Arc;

use actix_web::{get, post, web, HttpResponse, Responder};

use crate::handler::{self, InvocationEvent};
use crate::inference::ProbabilityModel;

#[post("/invocations")]
pub async fn invocations(
    model: web::Data<Arc<dyn ProbabilityModel>>,
    body: web::Bytes,
) -> impl Responder {
    let body = match String::from_utf8(body.to_vec()) {
        Ok(body) => body,
        Err(e) => return HttpResponse::InternalServerError().body(format!("Error: {}", e)),
    };
    match handler::handle(model.get_ref().as_ref(), &InvocationEvent { body }) {
        Ok(resp) => HttpResponse::Ok()
            .content_type("application/json")
            .body(resp.body),
        Err(e) => HttpResponse::InternalServerError().body(format!("Error: {:#}", e)),
    }
}

#[get("/ping")]
pub async fn ping() -> impl Responder {
    HttpResponse::Ok().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use actix_web::{test, App};
    use anyhow::Result;

    struct Uniform;

    impl ProbabilityModel for Uniform {
        fn predict_proba(&self, frame: &Frame) -> Result<Frame> {
            let labels = vec!["no".to_string(), "yes".to_string()];
            let data = labels.iter().map(|_| vec![0.5; frame.n_rows()]).collect();
            Frame::from_parts(labels, frame.index().to_vec(), data)
        }
    }

    fn app() -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        >,
    > {
        let model: Arc<dyn ProbabilityModel> = Arc::new(Uniform);
        App::new()
            .app_data(web::Data::new(model))
            .service(invocations)
            .service(ping)
    }

    #[actix_web::test]
    async fn invocations_returns_probability_json() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::post()
            .uri("/invocations")
            .set_payload(r#"[{"age": 34, "income": 50000}]"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert_eq!(body, r#"{"no":{"0":0.5},"yes":{"0":0.5}}"#.as_bytes());
    }

    #[actix_web::test]
    async fn malformed_bodies_get_a_500() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::post()
            .uri("/invocations")
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 500);
    }

    #[actix_web::test]
    async fn ping_answers_200() {
        let app = test::init_service(app()).await;
        let req = test::TestRequest::get().uri("/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
