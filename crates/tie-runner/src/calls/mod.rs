//! Stage calls: one resolved invocation of a pipeline program.
//!
//! Construction resolves everything up front (call id, output directory,
//! flags, positional arguments) and registers the call in the run's
//! [`CallRecordStore`], so a `StageCall` value is always complete. Each stage
//! contributes only its dynamic-resolution rules; see the per-stage modules.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::call_id::{CallId, Stage};
use crate::condition::{Condition, ConditionGroup};
use crate::config::{Config, ConfigValue};
use crate::errors::CallError;
use crate::options::{ArgValue, OptionMap};
use crate::records::{CallRecord, CallRecordStore};
use crate::RunMode;

mod cuffdiff;
mod cufflinks;
mod cuffmerge;
mod execute;
mod log;
mod resolve;
mod tophat;

pub use execute::{CallEnv, CallOutcome};
pub use log::CallLog;

use resolve::Resolver;

pub const ACCEPTED_HITS: &str = "accepted_hits.bam";
pub const TRANSCRIPTS_GTF: &str = "transcripts.gtf";
pub const MERGED_GTF: &str = "merged.gtf";
pub const ASSEMBLY_LIST: &str = "assembly_list.txt";

/// What a call runs over: one condition, or one group of conditions.
#[derive(Debug, Clone, Copy)]
pub enum CallSubject<'a> {
    Condition(&'a Condition),
    Group(&'a ConditionGroup),
}

impl CallSubject<'_> {
    pub fn name(&self) -> String {
        match self {
            CallSubject::Condition(c) => c.name.clone(),
            CallSubject::Group(g) => g.name(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            CallSubject::Condition(_) => "single condition",
            CallSubject::Group(_) => "condition group",
        }
    }
}

/// Run-wide inputs to call construction.
#[derive(Debug, Clone)]
pub struct CallContext<'a> {
    pub config: &'a Config,
    pub mode: RunMode,
    pub log_dir: PathBuf,
}

impl<'a> CallContext<'a> {
    pub fn new(config: &'a Config, mode: RunMode) -> Self {
        Self {
            config,
            mode,
            log_dir: config.log_dir(),
        }
    }
}

#[derive(Debug)]
pub struct StageCall {
    stage: Stage,
    call_id: CallId,
    mode: RunMode,
    out_dir: PathBuf,
    options: OptionMap,
    positional: Vec<String>,
    arg_str: String,
    log: Option<CallLog>,
    stderr_msg: String,
}

impl StageCall {
    /// Resolves the full command line for `stage` over `subject` and records
    /// the call in `store`.
    pub fn new(
        ctx: &CallContext<'_>,
        store: &mut CallRecordStore,
        stage: Stage,
        subject: CallSubject<'_>,
    ) -> Result<Self, CallError> {
        if stage.is_group_scoped() != matches!(subject, CallSubject::Group(_)) {
            return Err(CallError::SubjectMismatch {
                stage,
                subject: subject.kind(),
            });
        }
        let stage_options = ctx.config.stage_options(stage)?;
        let call_id = CallId::new(stage, subject.name());

        let log = match ctx.mode {
            RunMode::Analyze => Some(CallLog::create(&ctx.log_dir, &call_id)?),
            RunMode::DryRun | RunMode::QsubScript => None,
        };

        let out_dir = match stage_options.get("o") {
            Some(ConfigValue::Literal(path)) => PathBuf::from(path),
            _ => ctx.config.run.base_dir.join(call_id.to_string()),
        };

        let mut resolver = Resolver::new(
            ctx.config,
            ctx.mode,
            &call_id,
            &out_dir,
            stage_options,
            store,
            log.as_ref(),
        );
        resolver
            .options
            .set("o", ArgValue::Value(out_dir.display().to_string()));

        let positional = match (stage, subject) {
            (Stage::Tophat, CallSubject::Condition(c)) => tophat::resolve(&mut resolver, c)?,
            (Stage::Cufflinks, CallSubject::Condition(c)) => cufflinks::resolve(&mut resolver, c)?,
            (Stage::Cuffmerge, CallSubject::Group(g)) => cuffmerge::resolve(&mut resolver, g)?,
            (Stage::Cuffdiff, CallSubject::Group(g)) => cuffdiff::resolve(&mut resolver, g)?,
            (stage, subject) => {
                return Err(CallError::SubjectMismatch {
                    stage,
                    subject: subject.kind(),
                })
            }
        };
        let options = resolver.options;

        let mut tokens = options.to_flags();
        tokens.extend(positional.iter().cloned());
        let arg_str = tokens.join(" ");
        debug!(call_id = %call_id, arg_str = %arg_str, "resolved call");

        store.register(
            call_id.clone(),
            CallRecord {
                call_id: call_id.clone(),
                out_dir: out_dir.clone(),
            },
        );

        Ok(Self {
            stage,
            call_id,
            mode: ctx.mode,
            out_dir,
            options,
            positional,
            arg_str,
            log,
            stderr_msg: String::new(),
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn options(&self) -> &OptionMap {
        &self.options
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    /// Flags followed by positional arguments.
    pub fn arg_str(&self) -> &str {
        &self.arg_str
    }

    pub fn cmd_string(&self) -> String {
        format!("{} {}", self.stage.program(), self.arg_str)
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(|l| l.path())
    }
}

pub(crate) fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::testing::{condition, config_in, scratch_dir};

    fn record(store: &mut CallRecordStore, stage: Stage, subject: &str, out_dir: &Path) {
        let id = CallId::new(stage, subject);
        store.register(
            id.clone(),
            CallRecord {
                call_id: id,
                out_dir: out_dir.to_path_buf(),
            },
        );
    }

    fn first_condition(config: &Config) -> &Condition {
        config.conditions.iter().next().expect("at least one condition")
    }

    #[test]
    fn tophat_resolves_from_condition() {
        let base = scratch_dir("tophat_scenario");
        let raw = crate::testing::SAMPLE_CONFIG
            .replace("/data/base", &base.display().to_string())
            .replacen("  p: 8\n", "", 1)
            .replace("  no-coverage-search: true\n", "");
        let config = Config::from_yaml_str(&raw).expect("config");
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();

        let call = StageCall::new(
            &ctx,
            &mut store,
            Stage::Tophat,
            CallSubject::Condition(first_condition(&config)),
        )
        .expect("tophat call");

        assert_eq!(call.call_id().to_string(), "tophat_Aa0");
        assert_eq!(
            call.cmd_string(),
            format!(
                "tophat -o {}/tophat_Aa0 -G /ref/genes.gtf /data/indexes/genome \
                 /reads/Aa0_1.fq,/reads/Aa0_1b.fq /reads/Aa0_2.fq,/reads/Aa0_2b.fq",
                base.display()
            )
        );
        let registered = store
            .lookup(call.call_id())
            .expect("call registers itself");
        assert_eq!(registered.out_dir, base.join("tophat_Aa0"));
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn literal_output_dir_and_positional_are_used_verbatim() {
        let base = scratch_dir("tophat_literal");
        let raw = crate::testing::SAMPLE_CONFIG
            .replace("/data/base", &base.display().to_string())
            .replacen("o: from_conditions", "o: /custom/out", 1)
            .replacen("bowtie2_index: from_conditions", "bowtie2_index: /idx/hg19", 1);
        let config = Config::from_yaml_str(&raw).expect("config");
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();
        let call = StageCall::new(
            &ctx,
            &mut store,
            Stage::Tophat,
            CallSubject::Condition(first_condition(&config)),
        )
        .expect("tophat call");
        assert_eq!(call.out_dir(), Path::new("/custom/out"));
        assert!(call.arg_str().starts_with("-o /custom/out "), "{}", call.arg_str());
        assert_eq!(call.positional()[0], "/idx/hg19");
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn cufflinks_uses_tophat_record_and_omits_false_switches() {
        let base = scratch_dir("cufflinks_record");
        let config = config_in(&base);
        let ctx = CallContext::new(&config, RunMode::Analyze);
        let mut store = CallRecordStore::new();
        record(&mut store, Stage::Tophat, "Aa0", Path::new("/elsewhere/th_Aa0/"));

        let call = StageCall::new(
            &ctx,
            &mut store,
            Stage::Cufflinks,
            CallSubject::Condition(first_condition(&config)),
        )
        .expect("cufflinks call");

        assert_eq!(call.positional(), ["/elsewhere/th_Aa0/accepted_hits.bam"]);
        assert_eq!(
            call.arg_str(),
            format!(
                "-o {}/cufflinks_Aa0 -p 8 --GTF-guide /ref/genes.gtf --frag-bias-correct /ref/genome.fa \
                 --multi-read-correct --mask-file /ref/rRNA.gtf /elsewhere/th_Aa0/accepted_hits.bam",
                base.display()
            )
        );
        assert!(!call.arg_str().contains("upper-quartile-norm"));
        let log = fs::read_to_string(call.log_path().expect("analyze mode has a log"))
            .expect("read log");
        assert!(!log.contains("WARNING"), "record lookup must not fall back: {}", log);
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn construction_is_idempotent() {
        let base = scratch_dir("idempotent");
        let config = config_in(&base);
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();
        let condition = first_condition(&config);
        StageCall::new(&ctx, &mut store, Stage::Tophat, CallSubject::Condition(condition))
            .expect("tophat");
        let first = StageCall::new(&ctx, &mut store, Stage::Cufflinks, CallSubject::Condition(condition))
            .expect("first cufflinks");
        let second = StageCall::new(&ctx, &mut store, Stage::Cufflinks, CallSubject::Condition(condition))
            .expect("second cufflinks");
        assert_eq!(first.arg_str(), second.arg_str());
        assert_eq!(store.len(), 2);
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn missing_record_falls_back_to_base_dir() {
        let base = scratch_dir("fallback_disk");
        let config = config_in(&base);
        let bam_dir = base.join("tophat_Aa0");
        fs::create_dir_all(&bam_dir).expect("tophat dir");
        fs::write(bam_dir.join(ACCEPTED_HITS), b"").expect("bam");

        let ctx = CallContext::new(&config, RunMode::Analyze);
        let mut store = CallRecordStore::new();
        let call = StageCall::new(
            &ctx,
            &mut store,
            Stage::Cufflinks,
            CallSubject::Condition(first_condition(&config)),
        )
        .expect("fallback finds the bam");

        assert_eq!(
            call.positional(),
            [bam_dir.join(ACCEPTED_HITS).display().to_string()]
        );
        let log = fs::read_to_string(call.log_path().expect("log")).expect("read log");
        assert!(log.contains("WARNING: unable to find matching tophat call record"), "{}", log);
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn missing_artifact_is_fatal_when_analyzing() {
        let base = scratch_dir("fallback_missing");
        let config = config_in(&base);
        let ctx = CallContext::new(&config, RunMode::Analyze);
        let mut store = CallRecordStore::new();
        let err = StageCall::new(
            &ctx,
            &mut store,
            Stage::Cufflinks,
            CallSubject::Condition(first_condition(&config)),
        )
        .expect_err("nothing to find");

        match err {
            CallError::MissingUpstreamArtifact { file, path } => {
                assert_eq!(file, ACCEPTED_HITS);
                assert_eq!(path, base.join("tophat_Aa0").join(ACCEPTED_HITS));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(store.is_empty(), "failed construction must not register");
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn missing_artifact_is_tolerated_outside_analyze() {
        let base = scratch_dir("fallback_tolerated");
        let config = config_in(&base);
        for mode in [RunMode::DryRun, RunMode::QsubScript] {
            let ctx = CallContext::new(&config, mode);
            let mut store = CallRecordStore::new();
            let call = StageCall::new(
                &ctx,
                &mut store,
                Stage::Cufflinks,
                CallSubject::Condition(first_condition(&config)),
            )
            .expect("deferred");
            assert_eq!(
                call.positional(),
                [base.join("tophat_Aa0").join(ACCEPTED_HITS).display().to_string()]
            );
        }
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn cuffmerge_writes_manifest_of_assemblies() {
        let base = scratch_dir("cuffmerge_manifest");
        let config = config_in(&base);
        let group = &config.conditions.groups()[0];
        let ctx = CallContext::new(&config, RunMode::Analyze);
        let mut store = CallRecordStore::new();
        record(&mut store, Stage::Cufflinks, "Aa0", Path::new("/asm/Aa0"));
        record(&mut store, Stage::Cufflinks, "Ab0", Path::new("/asm/Ab0"));

        let call = StageCall::new(&ctx, &mut store, Stage::Cuffmerge, CallSubject::Group(group))
            .expect("cuffmerge");

        assert_eq!(call.call_id().to_string(), "cuffmerge_Aa0.Ab0");
        let manifest = base.join("cuffmerge_Aa0.Ab0").join(ASSEMBLY_LIST);
        assert_eq!(call.positional(), [manifest.display().to_string()]);
        let content = fs::read_to_string(&manifest).expect("manifest written");
        assert_eq!(content, "/asm/Aa0/transcripts.gtf\n/asm/Ab0/transcripts.gtf");
        assert!(call
            .arg_str()
            .contains("--ref-gtf /ref/genes.gtf --ref-sequence /ref/genome.fa"));
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn cuffmerge_dry_run_leaves_no_manifest_behind() {
        let base = scratch_dir("cuffmerge_dry");
        let config = config_in(&base);
        let group = &config.conditions.groups()[0];
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();
        let call = StageCall::new(&ctx, &mut store, Stage::Cuffmerge, CallSubject::Group(group))
            .expect("cuffmerge dry run");
        assert!(call.arg_str().ends_with(ASSEMBLY_LIST));
        assert!(!base.join("cuffmerge_Aa0.Ab0").exists());
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn cuffmerge_rejects_disagreeing_annotations() {
        let base = scratch_dir("cuffmerge_disagree");
        let config = config_in(&base);
        let mut other = condition("Ab0", "0");
        other.gtf_annotation = "/ref/other.gtf".to_string();
        let group = ConditionGroup {
            id: "0".to_string(),
            conditions: vec![condition("Aa0", "0"), other],
        };
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();
        let err = StageCall::new(&ctx, &mut store, Stage::Cuffmerge, CallSubject::Group(&group))
            .expect_err("annotations disagree");
        match err {
            CallError::ConfigurationDisagreement { group, option, .. } => {
                assert_eq!(group, "0");
                assert_eq!(option, "ref-gtf");
            }
            other => panic!("unexpected error: {}", other),
        }
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn cuffdiff_rejects_disagreeing_genomes() {
        let base = scratch_dir("cuffdiff_disagree");
        let config = config_in(&base);
        let mut other = condition("Ab0", "0");
        other.genome_seq = "/ref/other_genome.fa".to_string();
        let group = ConditionGroup {
            id: "0".to_string(),
            conditions: vec![condition("Aa0", "0"), other],
        };
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();
        let err = StageCall::new(&ctx, &mut store, Stage::Cuffdiff, CallSubject::Group(&group))
            .expect_err("genomes disagree");
        match err {
            CallError::ConfigurationDisagreement { group, option, values } => {
                assert_eq!(group, "0");
                assert_eq!(option, "frag-bias-correct");
                assert!(values.contains(&"/ref/other_genome.fa".to_string()), "{:?}", values);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(store.is_empty());
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn cuffdiff_chains_merge_and_alignment_outputs() {
        let base = scratch_dir("cuffdiff_chain");
        let config = config_in(&base);
        let group = &config.conditions.groups()[0];
        let ctx = CallContext::new(&config, RunMode::Analyze);
        let mut store = CallRecordStore::new();
        record(&mut store, Stage::Cuffmerge, "Aa0.Ab0", Path::new("/merge"));
        record(&mut store, Stage::Tophat, "Aa0", Path::new("/th/Aa0"));
        record(&mut store, Stage::Tophat, "Ab0", Path::new("/th/Ab0"));

        let call = StageCall::new(&ctx, &mut store, Stage::Cuffdiff, CallSubject::Group(group))
            .expect("cuffdiff");

        assert_eq!(
            call.positional(),
            ["/merge/merged.gtf", "/th/Aa0/accepted_hits.bam /th/Ab0/accepted_hits.bam"]
        );
        assert!(call.arg_str().contains("--labels Aa0,Ab0"));
        assert!(call.arg_str().contains("--mask-file /ref/rRNA.gtf"));
        let flags = call.options().to_flags();
        assert!(call.arg_str().starts_with(&flags.join(" ")));
        assert!(call
            .arg_str()
            .ends_with("/merge/merged.gtf /th/Aa0/accepted_hits.bam /th/Ab0/accepted_hits.bam"));
        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn stage_and_subject_must_match() {
        let base = scratch_dir("mismatch");
        let config = config_in(&base);
        let ctx = CallContext::new(&config, RunMode::DryRun);
        let mut store = CallRecordStore::new();
        let err = StageCall::new(
            &ctx,
            &mut store,
            Stage::Cuffmerge,
            CallSubject::Condition(first_condition(&config)),
        )
        .expect_err("cuffmerge needs a group");
        assert!(matches!(err, CallError::SubjectMismatch { stage: Stage::Cuffmerge, .. }));
        let _ = fs::remove_dir_all(base);
    }
}
