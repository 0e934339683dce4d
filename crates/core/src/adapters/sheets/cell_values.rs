use serde_json::Value;

/// Converts the raw cells of a values response into displayed strings.
pub trait IntoCellStrings {
    fn into_cell_strings(self) -> Vec<Vec<String>>;
}

impl IntoCellStrings for Vec<Vec<Value>> {
    fn into_cell_strings(self) -> Vec<Vec<String>> {
        self.into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect()
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
