//! Registry builders over the fixture tools.

use crate::common::{ChangeStateTool, FailingTool, GetLightsTool, LightBoard};
use std::sync::Arc;
use toolbridge_core::Result;
use toolbridge_tools::ToolRegistry;

/// Registry with `light.changeState`, `light.getLights` and `diag.fail`.
pub fn light_registry(board: &LightBoard) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(ChangeStateTool { board: board.clone() })?;
    registry.register(GetLightsTool { board: board.clone() })?;
    registry.register(FailingTool)?;
    Ok(registry)
}

pub fn shared_light_registry(board: &LightBoard) -> Result<Arc<ToolRegistry>> {
    light_registry(board).map(Arc::new)
}
