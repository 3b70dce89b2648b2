use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use log::info;

use tabular_infer::handler::{self, InvocationEvent};
use tabular_infer::inference::{TabularPredictor, DEFAULT_MODEL_DIR};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .format_module_path(false)
        .init();

    // Cold start: the artifact loads fully before the first event; a bad
    // artifact takes the process down instead of serving.
    let model_dir = std::env::var("MODEL_DIR").unwrap_or_else(|_| DEFAULT_MODEL_DIR.to_string());
    let model = TabularPredictor::load(&model_dir)?;
    info!("model loaded from {}", model_dir);

    let model = &model;
    run(service_fn(move |event: LambdaEvent<InvocationEvent>| async move {
        handler::handle(model, &event.payload).map_err(Error::from)
    }))
    .await
}
