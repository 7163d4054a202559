use super::resolve::Resolver;
use super::{ACCEPTED_HITS, MERGED_GTF};
use crate::call_id::{CallId, Stage};
use crate::condition::ConditionGroup;
use crate::errors::CallError;

pub(super) fn resolve(r: &mut Resolver<'_>, group: &ConditionGroup) -> Result<Vec<String>, CallError> {
    r.option("labels", |_| {
        let names: Vec<&str> = group.conditions.iter().map(|c| c.name.as_str()).collect();
        Ok(Some(names.join(",")))
    })?;
    r.option("mask-file", |_| {
        group.consensus("mask-file", |c| c.mask_file.as_deref())
    })?;
    r.option("frag-bias-correct", |_| {
        group.consensus("frag-bias-correct", |c| Some(c.genome_seq.as_str()))
    })?;

    let transcripts_gtf = r.positional("transcripts_gtf", |r| {
        let cuffmerge = r.call_id.for_stage(Stage::Cuffmerge);
        Ok(r.upstream_artifact(&cuffmerge, MERGED_GTF)?
            .display()
            .to_string())
    })?;
    // TODO: accept comma-joined replicate BAMs per condition once conditions
    // can carry replicates.
    let sample_bams = r.positional("sample_bams", |r| {
        let mut paths = Vec::with_capacity(group.conditions.len());
        for condition in &group.conditions {
            let tophat = CallId::new(Stage::Tophat, condition.name.as_str());
            paths.push(r.upstream_artifact(&tophat, ACCEPTED_HITS)?.display().to_string());
        }
        Ok(paths.join(" "))
    })?;

    Ok(vec![transcripts_gtf, sample_bams])
}
