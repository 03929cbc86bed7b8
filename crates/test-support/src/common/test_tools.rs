//! Test tool implementations used across test suites.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use toolbridge_core::{BridgeError, Result};
use toolbridge_tools::namespaces::NamespaceType;
use toolbridge_tools::HostTool;

/// Smart lighting namespace
pub struct Light;

impl NamespaceType for Light {
    const NAME: &'static str = "light";

    fn description() -> &'static str {
        "Smart lighting"
    }
}

/// Namespace for tools that misbehave on purpose
pub struct Diagnostics;

impl NamespaceType for Diagnostics {
    const NAME: &'static str = "diag";

    fn description() -> &'static str {
        "Diagnostic tools"
    }
}

/// Shared on/off state of every light, so tests can observe tool effects.
#[derive(Clone, Default)]
pub struct LightBoard {
    lights: Arc<Mutex<BTreeMap<String, bool>>>,
}

impl LightBoard {
    pub fn with_lights(ids: &[&str]) -> Self {
        let board = Self::default();
        for id in ids {
            board.set(id, false);
        }
        board
    }

    pub fn set(&self, id: &str, is_on: bool) {
        self.lights.lock().expect("light board lock").insert(id.to_string(), is_on);
    }

    pub fn get(&self, id: &str) -> Option<bool> {
        self.lights.lock().expect("light board lock").get(id).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.lights.lock().expect("light board lock").clone()
    }
}

/// Turns a light on or off
pub struct ChangeStateTool {
    pub board: LightBoard,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeStateInput {
    /// Id of the light to change
    pub id: String,
    #[serde(rename = "isOn")]
    pub is_on: bool,
    /// Brightness from 0 to 255
    #[serde(default)]
    pub brightness: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ChangeStateOutput {
    pub ok: bool,
}

#[async_trait]
impl HostTool for ChangeStateTool {
    type Namespace = Light;
    const LOCAL_NAME: &'static str = "changeState";
    type Input = ChangeStateInput;
    type Output = ChangeStateOutput;

    fn description(&self) -> &'static str {
        "Changes the state of a light"
    }

    async fn execute(&self, args: Self::Input) -> Result<Self::Output> {
        if self.board.get(&args.id).is_none() {
            return Err(BridgeError::ToolExecution(format!("Unknown light '{}'", args.id)));
        }
        tracing::info!(light = args.id.as_str(), is_on = args.is_on, "ChangeStateTool executed");
        self.board.set(&args.id, args.is_on);
        Ok(ChangeStateOutput { ok: true })
    }
}

/// Lists all lights
pub struct GetLightsTool {
    pub board: LightBoard,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GetLightsInput {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LightState {
    pub id: String,
    #[serde(rename = "isOn")]
    pub is_on: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetLightsOutput {
    pub lights: Vec<LightState>,
}

#[async_trait]
impl HostTool for GetLightsTool {
    type Namespace = Light;
    const LOCAL_NAME: &'static str = "getLights";
    type Input = GetLightsInput;
    type Output = GetLightsOutput;

    fn description(&self) -> &'static str {
        "Gets every light and whether it is on"
    }

    async fn execute(&self, _args: Self::Input) -> Result<Self::Output> {
        let lights = self
            .board
            .snapshot()
            .into_iter()
            .map(|(id, is_on)| LightState { id, is_on })
            .collect();
        Ok(GetLightsOutput { lights })
    }
}

/// Always fails; used to check error-shaped results
pub struct FailingTool;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailingInput {
    pub reason: String,
}

#[async_trait]
impl HostTool for FailingTool {
    type Namespace = Diagnostics;
    const LOCAL_NAME: &'static str = "fail";
    type Input = FailingInput;
    type Output = ChangeStateOutput;

    fn description(&self) -> &'static str {
        "Fails with the given reason"
    }

    async fn execute(&self, args: Self::Input) -> Result<Self::Output> {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Err(BridgeError::ToolExecution(args.reason))
    }
}
