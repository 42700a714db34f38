// Template AST - function trees used by series, series group and axis templates
use serde_json::{Map, Value};

/// A template node. Every JSON value which is not a function call is a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Function(RawFunction),
    Literal(Value),
}

/// `{ "functionName": ..., "functionArguments": { ... } }`
#[derive(Debug, Clone, PartialEq)]
pub struct RawFunction {
    pub function_name: String,
    pub function_arguments: Map<String, Value>,
}

impl Template {
    pub fn parse(value: &Value) -> Self {
        let function_name = value
            .as_object()
            .and_then(|object| object.get("functionName"))
            .and_then(Value::as_str);

        match function_name {
            Some(function_name) => {
                let function_arguments = value
                    .get("functionArguments")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                Template::Function(RawFunction {
                    function_name: function_name.to_string(),
                    function_arguments,
                })
            }
            None => Template::Literal(value.clone()),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Template::Function(_))
    }
}

impl RawFunction {
    /// Argument as a template; a missing argument is a `null` literal.
    pub fn argument(&self, name: &str) -> Template {
        self.function_arguments
            .get(name)
            .map(Template::parse)
            .unwrap_or(Template::Literal(Value::Null))
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.function_arguments.contains_key(name)
    }

    /// Argument taken as-is, without interpreting nested function calls.
    pub fn raw_argument(&self, name: &str) -> Option<&Value> {
        self.function_arguments.get(name)
    }
}

/// Series and series group templates. Each field is either given directly
/// (`name`) or computed by a function (`nameProvider`). The provider wins
/// when both are present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectTemplate {
    fields: Map<String, Value>,
}

impl ObjectTemplate {
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|fields| Self {
            fields: fields.clone(),
        })
    }

    pub fn field(&self, name: &str) -> Template {
        let provider_name = format!("{}Provider", name);
        match self.fields.get(&provider_name) {
            Some(provider) => Template::parse(provider),
            None => Template::Literal(self.fields.get(name).cloned().unwrap_or(Value::Null)),
        }
    }
}
