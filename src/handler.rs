use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::inference::ProbabilityModel;

/// One invocation. Only `body` is read; whatever else the platform
/// attaches to the event is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEvent {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

/// The whole request path: body → frame → probabilities → body. Every
/// failure crosses this boundary as the error arm; the front-ends surface
/// it through the platform's fault path, never as a 200.
pub fn handle(model: &dyn ProbabilityModel, event: &InvocationEvent) -> Result<InvocationResponse> {
    info!("{}", event.body);
    let frame = Frame::from_json(&event.body).context("decoding request body")?;
    info!("{}", frame);
    let probs = model.predict_proba(&frame)?;
    Ok(InvocationResponse {
        status_code: 200,
        body: probs.to_json(),
    })
}
