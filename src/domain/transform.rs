// Transform functions - synchronous value transformations used by axis value providers
use super::template::{RawFunction, Template};
use super::unit_format::format_value_with_unit;
use crate::error::{ChartError, ChartResult};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceEmptyStrategy {
    #[default]
    UseFallback,
    UsePrevious,
}

impl ReplaceEmptyStrategy {
    /// Unknown strategies fall back to `UseFallback`.
    pub fn from_value(value: &Value) -> Self {
        match value.as_str() {
            Some("usePrevious") => Self::UsePrevious,
            _ => Self::UseFallback,
        }
    }
}

/// Input of a transform evaluation.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    /// Value being transformed, exposed through `currentValue`.
    pub current_value: Value,
}

pub fn evaluate_transform(context: &TransformContext, template: &Template) -> ChartResult<Value> {
    let function = match template {
        Template::Literal(value) => return Ok(value.clone()),
        Template::Function(function) => function,
    };

    match function.function_name.as_str() {
        "literal" => Ok(function.raw_argument("data").cloned().unwrap_or(Value::Null)),
        "currentValue" => Ok(context.current_value.clone()),
        "abs" => {
            let input = evaluate_transform(context, &function.argument("inputDataProvider"))?;
            Ok(abs_value(&input))
        }
        "multiply" => {
            let inputs = evaluate_argument_list(context, function, "inputDataProviders")?;
            Ok(multiply_values(&inputs))
        }
        "replaceEmpty" => {
            if !function.has_argument("inputDataProvider") || !function.has_argument("fallbackValueProvider") {
                return Ok(Value::Null);
            }
            let data = evaluate_transform(context, &function.argument("inputDataProvider"))?;
            let fallback = evaluate_transform(context, &function.argument("fallbackValueProvider"))?;
            let strategy = evaluate_transform(context, &function.argument("strategyProvider"))?;
            Ok(replace_empty_values(
                &data,
                &fallback,
                ReplaceEmptyStrategy::from_value(&strategy),
            ))
        }
        "formatWithUnit" => {
            let input = evaluate_transform(context, &function.argument("inputDataProvider"))?;
            let unit_name = evaluate_transform(context, &function.argument("unitNameProvider"))?;
            let unit_options = evaluate_transform(context, &function.argument("unitOptionsProvider"))?;
            let format = |value: &Value| {
                value
                    .as_f64()
                    .and_then(|number| format_value_with_unit(number, unit_name.as_str(), Some(&unit_options)))
                    .map(Value::String)
                    .unwrap_or(Value::Null)
            };
            Ok(match &input {
                Value::Array(items) => Value::Array(items.iter().map(format).collect()),
                other => format(other),
            })
        }
        other => Err(ChartError::UnknownFunction {
            function_name: other.to_string(),
        }),
    }
}

fn evaluate_argument_list(
    context: &TransformContext,
    function: &RawFunction,
    name: &str,
) -> ChartResult<Vec<Value>> {
    match function.raw_argument(name) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| evaluate_transform(context, &Template::parse(item)))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Absolute value of a number or of every number in an array.
pub fn abs_value(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(abs_value).collect()),
        Value::Number(_) => value.as_f64().map(|n| number(n.abs())).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Multiplies numbers and equal-length arrays of numbers. Scalars are
/// broadcast over arrays. A `null` factor yields `null` at that position.
pub fn multiply_values(values: &[Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }

    let mut array_len = None;
    for value in values {
        match value {
            Value::Array(items) => match array_len {
                Some(len) if len != items.len() => return Value::Null,
                _ => array_len = Some(items.len()),
            },
            Value::Number(_) | Value::Null => {}
            _ => return Value::Null,
        }
    }

    let product_at = |index: Option<usize>| {
        let mut product = 1.0;
        for value in values {
            let factor = match (value, index) {
                (Value::Array(items), Some(i)) => items[i].as_f64(),
                (other, _) => other.as_f64(),
            };
            match factor {
                Some(factor) => product *= factor,
                None => return Value::Null,
            }
        }
        number(product)
    };

    match array_len {
        Some(len) => Value::Array((0..len).map(|i| product_at(Some(i))).collect()),
        None => product_at(None),
    }
}

/// Replaces `null`s in `data` (a single value or an array). `fallback` may be
/// an array of the same length as `data`, matched position by position.
pub fn replace_empty_values(data: &Value, fallback: &Value, strategy: ReplaceEmptyStrategy) -> Value {
    match (data, fallback) {
        (Value::Array(items), Value::Array(fallbacks)) => {
            if items.len() != fallbacks.len() {
                return Value::Null;
            }
            Value::Array(replace_nulls(items, strategy, |i| fallbacks[i].clone()))
        }
        (Value::Array(items), fallback) => Value::Array(replace_nulls(items, strategy, |_| fallback.clone())),
        (_, Value::Array(_)) => Value::Null,
        (Value::Null, fallback) => fallback.clone(),
        (data, _) => data.clone(),
    }
}

fn replace_nulls(
    items: &[Value],
    strategy: ReplaceEmptyStrategy,
    fallback_at: impl Fn(usize) -> Value,
) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let replaced = match result.last() {
            _ if !item.is_null() => item.clone(),
            Some(previous) if strategy == ReplaceEmptyStrategy::UsePrevious && !previous.is_null() => {
                previous.clone()
            }
            _ => fallback_at(i),
        };
        result.push(replaced);
    }
    result
}

pub(crate) fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
