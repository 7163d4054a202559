//! Fixtures shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;

use crate::condition::Condition;
use crate::config::Config;
use crate::errors::ExecError;
use crate::exec::{Executor, ProgramOutput};
use crate::notify::Notifier;

pub const SAMPLE_CONFIG: &str = r#"run_options:
  run_id: test_run
  base_dir: /data/base
  bowtie_indexes_dir: /data/indexes
  run_tophat: true
  run_cufflinks: true
  run_cuffmerge: true
  run_cuffdiff: true
email_info:
  email_from: pipeline@example.org
  email_to: me@example.org
  email_li: c2VjcmV0
tophat_options:
  o: from_conditions
  p: 8
  G: from_conditions
  no-coverage-search: true
  positional_args:
    bowtie2_index: from_conditions
    left_reads: from_conditions
    right_reads: from_conditions
cufflinks_options:
  o: from_conditions
  p: 8
  GTF-guide: from_conditions
  frag-bias-correct: from_conditions
  multi-read-correct: true
  upper-quartile-norm: false
  mask-file: from_conditions
  positional_args:
    accepted_hits: from_conditions
cuffmerge_options:
  o: from_conditions
  p: 8
  ref-gtf: from_conditions
  ref-sequence: from_conditions
  positional_args:
    assembly_list: from_conditions
cuffdiff_options:
  o: from_conditions
  p: 8
  labels: from_conditions
  frag-bias-correct: from_conditions
  mask-file: from_conditions
  positional_args:
    transcripts_gtf: from_conditions
    sample_bams: from_conditions
qsub_options:
  queues: [bio, pub64]
  datahome: /data/home
  core_range: 8-16
  ld_library_path: /opt/lib
  template: /data/base/qsub.mako
  script_dir: /data/base/scripts
condition_queue:
  - name: Aa0
    group_id: 0
    left_reads: [/reads/Aa0_1.fq, /reads/Aa0_1b.fq]
    right_reads: [/reads/Aa0_2.fq, /reads/Aa0_2b.fq]
    genome_seq: /ref/genome.fa
    gtf_annotation: /ref/genes.gtf
    bowtie2_index: genome
    mask_file: /ref/rRNA.gtf
  - name: Ab0
    group_id: 0
    left_reads: [/reads/Ab0_1.fq]
    right_reads: [/reads/Ab0_2.fq]
    genome_seq: /ref/genome.fa
    gtf_annotation: /ref/genes.gtf
    bowtie2_index: genome
    mask_file: /ref/rRNA.gtf
"#;

/// The sample configuration with every `/data/base` path moved under `base`.
pub fn config_in(base: &Path) -> Config {
    let raw = SAMPLE_CONFIG.replace("/data/base", &base.display().to_string());
    Config::from_yaml_str(&raw).expect("sample config is valid")
}

pub fn scratch_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "blacktie_{}_{}_{}",
        label,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

pub fn condition(name: &str, group_id: &str) -> Condition {
    Condition {
        name: name.to_string(),
        group_id: group_id.to_string(),
        left_reads: vec![format!("/reads/{}_1.fq", name)],
        right_reads: vec![format!("/reads/{}_2.fq", name)],
        genome_seq: "/ref/genome.fa".to_string(),
        gtf_annotation: "/ref/genes.gtf".to_string(),
        bowtie2_index: "genome".to_string(),
        mask_file: None,
    }
}

static SIGNAL_TESTS: Mutex<()> = Mutex::new(());

/// Serialises tests that run real child processes, since a SIGINT sent by one
/// of them is visible to every executor in the process.
pub fn signal_lock() -> MutexGuard<'static, ()> {
    SIGNAL_TESTS.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

type Behavior = Box<dyn FnMut(&str, &str) -> Result<ProgramOutput, ExecError>>;

/// Records every command and answers with a scripted result.
pub struct FakeExecutor {
    pub calls: Vec<(String, String)>,
    behavior: Behavior,
}

impl FakeExecutor {
    pub fn new<F>(behavior: F) -> Self
    where
        F: FnMut(&str, &str) -> Result<ProgramOutput, ExecError> + 'static,
    {
        Self {
            calls: Vec::new(),
            behavior: Box::new(behavior),
        }
    }
}

impl Executor for FakeExecutor {
    fn run(&mut self, program: &str, arg_str: &str) -> Result<ProgramOutput, ExecError> {
        self.calls.push((program.to_string(), arg_str.to_string()));
        (self.behavior)(program, arg_str)
    }
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub credential: String,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Vec<SentMail>,
}

impl Notifier for RecordingNotifier {
    fn send(
        &mut self,
        _from: &str,
        to: &str,
        subject: &str,
        body: &str,
        credential: &str,
    ) -> Result<()> {
        self.sent.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            credential: credential.to_string(),
        });
        Ok(())
    }
}
