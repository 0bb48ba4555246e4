// Terraform output values (`terraform output -json`)

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, Table};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A single output variable as reported by Terraform
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub(crate) struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
    /// Terraform type constraint, e.g. `"string"` or `["list", "string"]`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<Value>,
}

impl OutputValue {
    /// Value for display; sensitive values are masked
    fn display_value(&self) -> String {
        if self.sensitive {
            return "(sensitive)".to_string();
        }
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn display_type(&self) -> String {
        match &self.value_type {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        }
    }
}

/// All outputs of one provisioning run, keyed by output name
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub(crate) struct ProvisionOutput {
    outputs: BTreeMap<String, OutputValue>,
}

impl ProvisionOutput {
    /// Parse the document printed by `terraform output -json`
    pub(crate) fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub(crate) fn get(&self, name: &str) -> Option<&OutputValue> {
        self.outputs.get(name)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Registry URI stored under `key`.
    ///
    /// Absent when the output is missing or its value is not a string.
    pub(crate) fn registry_uri(&self, key: &str) -> Option<&str> {
        self.get(key)?.value.as_str()
    }

    pub(crate) fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub(crate) fn to_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("OUTPUT").add_attribute(Attribute::Bold),
                Cell::new("TYPE").add_attribute(Attribute::Bold),
                Cell::new("VALUE").add_attribute(Attribute::Bold),
            ]);

        for (name, output) in &self.outputs {
            table.add_row(vec![
                Cell::new(name),
                Cell::new(output.display_type()),
                Cell::new(output.display_value()),
            ]);
        }

        table
    }
}
