use serde::{Deserialize, Deserializer};

use crate::errors::CallError;

/// One experimental sample from `condition_queue`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Condition {
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub group_id: String,
    pub left_reads: Vec<String>,
    pub right_reads: Vec<String>,
    pub genome_seq: String,
    pub gtf_annotation: String,
    pub bowtie2_index: String,
    #[serde(default)]
    pub mask_file: Option<String>,
}

/// Conditions sharing a `group_id`, in queue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionGroup {
    pub id: String,
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    /// Condition names joined with `.`; the subject of group-scoped call ids.
    pub fn name(&self) -> String {
        self.conditions
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// The single value every condition in the group has for a field.
    ///
    /// A condition without the field counts as its own value, so a group in
    /// which only some conditions set a mask file does not agree.
    pub fn consensus<F>(&self, option: &str, field: F) -> Result<Option<String>, CallError>
    where
        F: Fn(&Condition) -> Option<&str>,
    {
        let mut distinct: Vec<Option<&str>> = Vec::new();
        for condition in &self.conditions {
            let value = field(condition);
            if !distinct.contains(&value) {
                distinct.push(value);
            }
        }
        match distinct.as_slice() {
            [only] => Ok(only.map(str::to_string)),
            [] => Ok(None),
            many => Err(CallError::ConfigurationDisagreement {
                group: self.id.clone(),
                option: option.to_string(),
                values: many
                    .iter()
                    .map(|v| v.unwrap_or("none").to_string())
                    .collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Groups in order of first appearance in the queue.
    pub fn groups(&self) -> Vec<ConditionGroup> {
        let mut groups: Vec<ConditionGroup> = Vec::new();
        for condition in &self.conditions {
            match groups.iter_mut().find(|g| g.id == condition.group_id) {
                Some(group) => group.conditions.push(condition.clone()),
                None => groups.push(ConditionGroup {
                    id: condition.group_id.clone(),
                    conditions: vec![condition.clone()],
                }),
            }
        }
        groups
    }
}

/// Accepts any YAML scalar and keeps its textual form.
pub(crate) fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar, found {:?}",
            other
        ))),
    }
}
