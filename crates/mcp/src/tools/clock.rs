// Clock tool

use chrono::Local;
use std::sync::Arc;
use toolbridge_core::{ToolArgs, ToolDescriptor, ToolEntry, ToolError, ToolHandler, ToolOutput};

/// Local date-time without offset, e.g. `2024-05-01T13:45:12.123456789`
pub fn current_time() -> String {
    Local::now()
        .naive_local()
        .format("%Y-%m-%dT%H:%M:%S%.f")
        .to_string()
}

pub fn tools() -> Vec<ToolEntry> {
    let handler: Arc<dyn ToolHandler> =
        Arc::new(|_: &ToolArgs| -> Result<ToolOutput, ToolError> { Ok(ToolOutput::Text(current_time())) });

    vec![(
        ToolDescriptor::new(
            "getCurrentTime",
            "Get the current date and time in ISO format",
        ),
        handler,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_is_iso_local() {
        let now = current_time();
        assert!(chrono::NaiveDateTime::parse_from_str(&now, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
        assert!(!now.ends_with('Z'));
    }

    #[test]
    fn test_registers_one_tool_without_parameters() {
        let tools = tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].0.name, "getCurrentTime");
        assert!(tools[0].0.parameters.is_empty());
    }
}
