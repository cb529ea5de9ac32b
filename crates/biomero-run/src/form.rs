use biomero_api::payload::{InputType, WorkflowInput, WorkflowMetadata};
use biomero_core::keybinds::LineInput;
use serde_json::{Map, Number, Value};

/// Inputs with this prefix are filled in by the server.
const SERVER_INPUT_PREFIX: &str = "cytomine";

/// One editable workflow parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub id: String,
    pub label: String,
    pub description: String,
    pub kind: InputType,
    pub optional: bool,
    /// Text for String and Number fields.
    pub text: LineInput,
    /// Value for Boolean fields.
    pub flag: bool,
}

impl FormField {
    fn from_input(input: &WorkflowInput) -> Self {
        let label = if input.name.is_empty() {
            input.id.clone()
        } else {
            input.name.clone()
        };
        let default = input.default_value.as_ref();
        let (text, flag) = match input.input_type {
            InputType::Number => (
                default
                    .and_then(value_as_text)
                    .unwrap_or_else(|| "0".to_string()),
                false,
            ),
            InputType::Boolean => (
                String::new(),
                default.is_some_and(|v| match v {
                    Value::Bool(b) => *b,
                    Value::String(s) => s.eq_ignore_ascii_case("true"),
                    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                    _ => false,
                }),
            ),
            _ => (default.and_then(value_as_text).unwrap_or_default(), false),
        };
        Self {
            id: input.id.clone(),
            label,
            description: input.description.clone(),
            kind: input.input_type,
            optional: input.optional,
            text: LineInput::with_text(text),
            flag,
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == InputType::Boolean
    }

    /// Text shown in the form for the current value.
    pub fn display_value(&self) -> String {
        if self.is_boolean() {
            let mark = if self.flag { "[x]" } else { "[ ]" };
            mark.to_string()
        } else {
            self.text.text.clone()
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.is_boolean() {
            return Ok(());
        }
        let text = self.text.text.trim();
        if text.is_empty() {
            return if self.optional {
                Ok(())
            } else {
                Err(format!("{} is required", self.label))
            };
        }
        if self.kind == InputType::Number && parse_number(text).is_none() {
            return Err(format!("{} must be a number", self.label));
        }
        Ok(())
    }

    fn value(&self) -> Option<Value> {
        match self.kind {
            InputType::Boolean => Some(Value::Bool(self.flag)),
            InputType::Number => parse_number(self.text.text.trim()).map(Value::Number),
            _ => {
                let text = self.text.text.trim();
                (!text.is_empty()).then(|| Value::String(text.to_string()))
            }
        }
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// JSON has no NaN or infinity, so only finite values count as numbers.
fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Parameter form generated from a workflow descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamForm {
    pub fields: Vec<FormField>,
    pub cursor: usize,
}

impl ParamForm {
    /// Build the form, leaving out server-filled inputs and types the form
    /// cannot edit.
    pub fn from_metadata(metadata: &WorkflowMetadata) -> Self {
        let fields = metadata
            .inputs
            .iter()
            .filter(|input| !input.id.starts_with(SERVER_INPUT_PREFIX))
            .filter(|input| input.input_type != InputType::Other)
            .map(FormField::from_input)
            .collect();
        Self { fields, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn current(&self) -> Option<&FormField> {
        self.fields.get(self.cursor)
    }

    pub fn current_mut(&mut self) -> Option<&mut FormField> {
        self.fields.get_mut(self.cursor)
    }

    pub fn move_down(&mut self) {
        if self.cursor + 1 < self.fields.len() {
            self.cursor += 1;
        }
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Flip the Boolean field under the cursor. Returns false for other
    /// kinds.
    pub fn toggle_current(&mut self) -> bool {
        match self.current_mut() {
            Some(field) if field.is_boolean() => {
                field.flag = !field.flag;
                true
            }
            _ => false,
        }
    }

    /// First validation error, if any.
    pub fn validate(&self) -> Result<(), String> {
        self.fields.iter().try_for_each(FormField::validate)
    }

    /// Parameter values keyed by input id. Empty optional fields are left out.
    pub fn values(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| f.value().map(|v| (f.id.clone(), v)))
            .collect()
    }
}
