// Calculator tools: basic floating-point arithmetic

use std::sync::Arc;
use toolbridge_core::{
    ParamSpec, ToolArgs, ToolDescriptor, ToolEntry, ToolError, ToolHandler, ToolOutput,
};

/// Descriptor + handler for a two-operand operation
fn binary(
    name: &str,
    description: &str,
    lhs: &'static str,
    rhs: &'static str,
    op: fn(f64, f64) -> Result<f64, ToolError>,
) -> ToolEntry {
    let descriptor = ToolDescriptor::new(name, description)
        .param(ParamSpec::number(lhs))
        .param(ParamSpec::number(rhs));

    let handler: Arc<dyn ToolHandler> = Arc::new(move |args: &ToolArgs| -> Result<ToolOutput, ToolError> {
        op(args.number(lhs)?, args.number(rhs)?).map(ToolOutput::Number)
    });

    (descriptor, handler)
}

pub fn add(a: f64, b: f64) -> Result<f64, ToolError> {
    Ok(a + b)
}

pub fn subtract(a: f64, b: f64) -> Result<f64, ToolError> {
    Ok(a - b)
}

pub fn multiply(a: f64, b: f64) -> Result<f64, ToolError> {
    Ok(a * b)
}

pub fn divide(a: f64, b: f64) -> Result<f64, ToolError> {
    if b == 0.0 {
        return Err(ToolError::domain("Cannot divide by zero"));
    }
    Ok(a / b)
}

pub fn power(base: f64, exponent: f64) -> Result<f64, ToolError> {
    Ok(base.powf(exponent))
}

pub fn sqrt(number: f64) -> Result<f64, ToolError> {
    if number < 0.0 {
        return Err(ToolError::domain(
            "Cannot calculate square root of negative number",
        ));
    }
    Ok(number.sqrt())
}

/// Calculator registration list
pub fn tools() -> Vec<ToolEntry> {
    let sqrt_tool = {
        let descriptor = ToolDescriptor::new(
            "sqrt",
            "Calculate the square root of a number. Returns error if number is negative",
        )
        .param(ParamSpec::number("number"));
        let handler: Arc<dyn ToolHandler> = Arc::new(|args: &ToolArgs| -> Result<ToolOutput, ToolError> {
            sqrt(args.number("number")?).map(ToolOutput::Number)
        });
        (descriptor, handler)
    };

    vec![
        binary("add", "Add two numbers together", "a", "b", add),
        binary("subtract", "Subtract b from a", "a", "b", subtract),
        binary("multiply", "Multiply two numbers", "a", "b", multiply),
        binary(
            "divide",
            "Divide a by b. Returns error if b is zero",
            "a",
            "b",
            divide,
        ),
        binary(
            "power",
            "Calculate base raised to the power of exponent",
            "base",
            "exponent",
            power,
        ),
        sqrt_tool,
    ]
}
