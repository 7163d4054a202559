use crate::config::{ConfigValue, StageOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Switch(bool),
    Value(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionMap {
    entries: Vec<(String, ArgValue)>,
}

impl OptionMap {
    /// Every option the section declares, with derived ones left unset
    /// (`Switch(false)`) until the stage fills them in.
    pub fn from_stage_options(options: &StageOptions) -> Self {
        let entries = options
            .options()
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    ConfigValue::FromConditions => ArgValue::Switch(false),
                    ConfigValue::Switch(b) => ArgValue::Switch(*b),
                    ConfigValue::Literal(s) => ArgValue::Value(s.clone()),
                };
                (name.clone(), value)
            })
            .collect();
        Self { entries }
    }

    pub fn set(&mut self, name: &str, value: ArgValue) {
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// `-x`/`--long` flags; switches emit only the flag, unset options
    /// nothing.
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        for (name, value) in &self.entries {
            if *value == ArgValue::Switch(false) {
                continue;
            }
            if name.chars().count() == 1 {
                flags.push(format!("-{}", name));
            } else {
                flags.push(format!("--{}", name));
            }
            if let ArgValue::Value(v) = value {
                flags.push(v.clone());
            }
        }
        flags
    }
}
