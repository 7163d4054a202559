use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Tophat,
    Cufflinks,
    Cuffmerge,
    Cuffdiff,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Tophat,
        Stage::Cufflinks,
        Stage::Cuffmerge,
        Stage::Cuffdiff,
    ];

    /// Name of the external program, also the call id prefix.
    pub fn program(self) -> &'static str {
        match self {
            Stage::Tophat => "tophat",
            Stage::Cufflinks => "cufflinks",
            Stage::Cuffmerge => "cuffmerge",
            Stage::Cuffdiff => "cuffdiff",
        }
    }

    /// Short prefix used for batch job names.
    pub fn nickname(self) -> &'static str {
        match self {
            Stage::Tophat => "th",
            Stage::Cufflinks => "cl",
            Stage::Cuffmerge => "cm",
            Stage::Cuffdiff => "cd",
        }
    }

    pub fn options_key(self) -> &'static str {
        match self {
            Stage::Tophat => "tophat_options",
            Stage::Cufflinks => "cufflinks_options",
            Stage::Cuffmerge => "cuffmerge_options",
            Stage::Cuffdiff => "cuffdiff_options",
        }
    }

    /// Positional arguments in the order they follow the flags.
    pub fn positional_args(self) -> &'static [&'static str] {
        match self {
            Stage::Tophat => &["bowtie2_index", "left_reads", "right_reads"],
            Stage::Cufflinks => &["accepted_hits"],
            Stage::Cuffmerge => &["assembly_list"],
            Stage::Cuffdiff => &["transcripts_gtf", "sample_bams"],
        }
    }

    pub fn is_group_scoped(self) -> bool {
        matches!(self, Stage::Cuffmerge | Stage::Cuffdiff)
    }

    pub fn from_program(name: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.program() == name)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// `<program>_<subject>`, where the subject is a condition name or a group
/// name. Doubles as the key into the call record store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallId {
    pub stage: Stage,
    pub subject: String,
}

impl CallId {
    pub fn new(stage: Stage, subject: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
        }
    }

    /// Same subject, different stage: `cuffdiff_A.B` -> `cuffmerge_A.B`.
    pub fn for_stage(&self, stage: Stage) -> Self {
        Self::new(stage, self.subject.clone())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.stage.program(), self.subject)
    }
}

impl FromStr for CallId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, subject) = s
            .split_once('_')
            .ok_or_else(|| anyhow!("call id has no stage prefix: {}", s))?;
        let stage =
            Stage::from_program(prefix).ok_or_else(|| anyhow!("unknown stage in call id: {}", s))?;
        if subject.is_empty() {
            return Err(anyhow!("call id has an empty subject: {}", s));
        }
        Ok(CallId::new(stage, subject))
    }
}
