// This is free and unencumbered software released into the public domain.

//! Method-call dispatch between an application layer and the session directory.
//!
//! Requests arrive as a method name plus JSON arguments and are answered with
//! either a JSON value or a [`MethodError`] carrying a stable code.

use crate::{
    session::SessionDirectory,
    shared::{CameraError, DeviceDescriptor, LifecycleEvent, ResolutionPreset},
};
use derive_more::Display;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, PartialEq)]
pub struct MethodCall {
    pub method: String,
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn without_arguments(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }

    fn string_argument(&self, name: &str) -> Result<&str, MethodError> {
        self.arguments
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                MethodError::from(CameraError::invalid_argument(format!(
                    "`{}` requires a string argument `{name}`",
                    self.method
                )))
            })
    }
}

#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{code}: {message}")]
pub struct MethodError {
    pub code: String,
    pub message: String,
}

impl core::error::Error for MethodError {}

impl From<CameraError> for MethodError {
    fn from(err: CameraError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.message(),
        }
    }
}

pub type MethodResult = Result<Value, MethodError>;

#[derive(Clone)]
pub struct MethodHandler {
    directory: Arc<SessionDirectory>,
}

impl MethodHandler {
    pub fn new(directory: Arc<SessionDirectory>) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    pub fn handle(&self, call: &MethodCall) -> MethodResult {
        match call.method.as_str() {
            "availableCameras" => {
                let devices = self.directory.available_cameras()?;
                Ok(Value::Array(devices.iter().map(describe_camera).collect()))
            },
            "initialize" => {
                let camera = call.string_argument("cameraName")?;
                let preset: ResolutionPreset = call.string_argument("resolutionPreset")?.parse()?;
                let info = self.directory.initialize(camera, preset)?;
                Ok(json!({
                    "textureId": info.surface.0,
                    "previewWidth": info.preview.width,
                    "previewHeight": info.preview.height,
                }))
            },
            "takePicture" => {
                let path = call.string_argument("path")?;
                let path = self.directory.take_picture(path)?;
                Ok(Value::String(path.to_string_lossy().into_owned()))
            },
            "dispose" => {
                self.directory.dispose();
                Ok(Value::Null)
            },
            other => {
                debug!(method = other, "ignoring unknown method");
                Ok(Value::Null)
            },
        }
    }

    /// Forwards a host lifecycle signal to the active session.
    pub fn lifecycle(&self, event: LifecycleEvent) -> Result<(), MethodError> {
        Ok(self.directory.on_lifecycle(event)?)
    }
}

/// The wire shape of one `availableCameras` entry.
pub fn describe_camera(device: &DeviceDescriptor) -> Value {
    let mut map = Map::new();
    map.insert("name".into(), Value::String(device.id.clone()));
    map.insert("lensFacing".into(), Value::String(device.facing.to_string()));
    map.insert("sensorOrientation".into(), json!(device.sensor_orientation));
    Value::Object(map)
}
