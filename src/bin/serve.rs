use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use log::{error, info};

use tabular_infer::http;
use tabular_infer::inference::{ProbabilityModel, TabularPredictor, DEFAULT_MODEL_DIR};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    let model_dir = std::env::var("MODEL_DIR").unwrap_or_else(|_| DEFAULT_MODEL_DIR.to_string());
    let model: Arc<dyn ProbabilityModel> = match TabularPredictor::load(&model_dir) {
        Ok(model) => {
            info!("model loaded from {}", model_dir);
            Arc::new(model)
        }
        Err(e) => {
            error!("{:#}", e);
            panic!("unable to load model: {}", e);
        }
    };
    let model_data = web::Data::new(model);

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let workers = std::env::var("WORKERS")
        .map(|w| w.parse().unwrap_or(num_cpus::get()))
        .unwrap_or_else(|_| num_cpus::get());
    let bind_address = format!("{}:{}", host, port);

    info!("serving on http://{}", bind_address);
    info!("   GET  /ping         - readiness");
    info!("   POST /invocations  - probability prediction");

    HttpServer::new(move || {
        App::new()
            .app_data(model_data.clone())
            .service(http::invocations)
            .service(http::ping)
    })
    .workers(workers)
    .bind(&bind_address)?
    .run()
    .await
}
