use std::fs;

use super::resolve::Resolver;
use super::{absolute, ASSEMBLY_LIST, TRANSCRIPTS_GTF};
use crate::call_id::{CallId, Stage};
use crate::condition::ConditionGroup;
use crate::errors::CallError;
use crate::RunMode;

pub(super) fn resolve(r: &mut Resolver<'_>, group: &ConditionGroup) -> Result<Vec<String>, CallError> {
    r.option("ref-gtf", |_| {
        group.consensus("ref-gtf", |c| Some(c.gtf_annotation.as_str()))
    })?;
    r.option("ref-sequence", |_| {
        group.consensus("ref-sequence", |c| Some(c.genome_seq.as_str()))
    })?;

    let assembly_list = r.positional("assembly_list", |r| write_assembly_list(r, group))?;

    Ok(vec![assembly_list])
}

/// Writes one cufflinks `transcripts.gtf` path per line into
/// `<out_dir>/assembly_list.txt` and returns the manifest's absolute path.
fn write_assembly_list(r: &Resolver<'_>, group: &ConditionGroup) -> Result<String, CallError> {
    let mut paths = Vec::with_capacity(group.conditions.len());
    for condition in &group.conditions {
        let cufflinks = CallId::new(Stage::Cufflinks, condition.name.as_str());
        let gtf = r.upstream_artifact(&cufflinks, TRANSCRIPTS_GTF)?;
        paths.push(gtf.display().to_string());
    }

    let created = !r.out_dir.exists();
    fs::create_dir_all(r.out_dir)?;
    let manifest = absolute(r.out_dir)?.join(ASSEMBLY_LIST);
    fs::write(&manifest, paths.join("\n"))?;

    // Nothing consumes the manifest in a dry run.
    if r.mode == RunMode::DryRun {
        fs::remove_file(&manifest)?;
        if created {
            fs::remove_dir(r.out_dir)?;
        }
    }

    Ok(manifest.display().to_string())
}
