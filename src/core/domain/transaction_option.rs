use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionMode {
    /// Short transaction validated at commit time.
    Optimistic,
    /// Long transaction that declares its write targets upfront.
    Long,
    ReadOnly,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionMode::Optimistic => "OCC",
            TransactionMode::Long => "LTX",
            TransactionMode::ReadOnly => "RTX",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionPriority {
    Interrupt,
    Wait,
    InterruptExclude,
    WaitExclude,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionOptionError {
    #[error("{0} transaction requires at least one write preserve target")]
    MissingWritePreserve(TransactionMode),
    #[error("{0} transaction cannot declare write preserve targets")]
    UnexpectedWritePreserve(TransactionMode),
    #[error("{0} transaction cannot restrict read areas")]
    UnexpectedReadArea(TransactionMode),
    #[error("resource name must not be empty")]
    EmptyResourceName,
}

/// Immutable description of how one transaction attempt is opened.
///
/// Instances are built through [`TransactionOption::occ`],
/// [`TransactionOption::ltx`], [`TransactionOption::rtx`] or
/// [`TransactionOption::ddl`] and refined with the `with_*` methods, each of
/// which returns a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOption {
    mode: TransactionMode,
    #[serde(default)]
    write_preserve: Vec<String>,
    #[serde(default)]
    inclusive_read_areas: Vec<String>,
    #[serde(default)]
    exclusive_read_areas: Vec<String>,
    #[serde(default)]
    priority: Option<TransactionPriority>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    include_ddl: bool,
}

impl TransactionOption {
    pub fn occ() -> Self {
        Self::empty(TransactionMode::Optimistic)
    }

    pub fn rtx() -> Self {
        Self::empty(TransactionMode::ReadOnly)
    }

    pub fn ltx<I, S>(write_preserve: I) -> Result<Self, TransactionOptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut option = Self::empty(TransactionMode::Long);
        for target in write_preserve {
            push_unique(&mut option.write_preserve, target.into())?;
        }
        option.validate()?;
        Ok(option)
    }

    /// LONG transaction permitted to run DDL without declaring write targets.
    pub fn ddl() -> Self {
        Self {
            include_ddl: true,
            ..Self::empty(TransactionMode::Long)
        }
    }

    fn empty(mode: TransactionMode) -> Self {
        Self {
            mode,
            write_preserve: Vec::new(),
            inclusive_read_areas: Vec::new(),
            exclusive_read_areas: Vec::new(),
            priority: None,
            label: None,
            include_ddl: false,
        }
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn write_preserve(&self) -> &[String] {
        &self.write_preserve
    }

    pub fn inclusive_read_areas(&self) -> &[String] {
        &self.inclusive_read_areas
    }

    pub fn exclusive_read_areas(&self) -> &[String] {
        &self.exclusive_read_areas
    }

    pub fn priority(&self) -> Option<TransactionPriority> {
        self.priority
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn include_ddl(&self) -> bool {
        self.include_ddl
    }

    pub fn with_label(&self, label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..self.clone()
        }
    }

    pub fn with_priority(&self, priority: TransactionPriority) -> Self {
        Self {
            priority: Some(priority),
            ..self.clone()
        }
    }

    pub fn with_inclusive_read_areas<I, S>(&self, areas: I) -> Result<Self, TransactionOptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut option = self.clone();
        for area in areas {
            push_unique(&mut option.inclusive_read_areas, area.into())?;
        }
        option.validate()?;
        Ok(option)
    }

    pub fn with_exclusive_read_areas<I, S>(&self, areas: I) -> Result<Self, TransactionOptionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut option = self.clone();
        for area in areas {
            push_unique(&mut option.exclusive_read_areas, area.into())?;
        }
        option.validate()?;
        Ok(option)
    }

    /// Checks the mode-specific invariants. Deserialized options must pass
    /// this before use.
    pub fn validate(&self) -> Result<(), TransactionOptionError> {
        let has_read_areas =
            !self.inclusive_read_areas.is_empty() || !self.exclusive_read_areas.is_empty();
        match self.mode {
            TransactionMode::Long => {
                if self.write_preserve.is_empty() && !self.include_ddl {
                    return Err(TransactionOptionError::MissingWritePreserve(self.mode));
                }
            }
            TransactionMode::Optimistic => {
                if !self.write_preserve.is_empty() {
                    return Err(TransactionOptionError::UnexpectedWritePreserve(self.mode));
                }
                if has_read_areas {
                    return Err(TransactionOptionError::UnexpectedReadArea(self.mode));
                }
            }
            TransactionMode::ReadOnly => {
                if !self.write_preserve.is_empty() {
                    return Err(TransactionOptionError::UnexpectedWritePreserve(self.mode));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for TransactionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode)?;
        if !self.write_preserve.is_empty() {
            write!(f, "{{wp={}}}", self.write_preserve.join(","))?;
        }
        if let Some(label) = &self.label {
            write!(f, "[{}]", label)?;
        }
        Ok(())
    }
}

fn push_unique(targets: &mut Vec<String>, name: String) -> Result<(), TransactionOptionError> {
    if name.trim().is_empty() {
        return Err(TransactionOptionError::EmptyResourceName);
    }
    if !targets.contains(&name) {
        targets.push(name);
    }
    Ok(())
}
