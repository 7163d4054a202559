use super::resolve::Resolver;
use super::ACCEPTED_HITS;
use crate::call_id::{CallId, Stage};
use crate::condition::Condition;
use crate::errors::CallError;

pub(super) fn resolve(r: &mut Resolver<'_>, condition: &Condition) -> Result<Vec<String>, CallError> {
    r.option("GTF-guide", |_| Ok(Some(condition.gtf_annotation.clone())))?;
    r.option("frag-bias-correct", |_| Ok(Some(condition.genome_seq.clone())))?;
    r.option("mask-file", |_| Ok(condition.mask_file.clone()))?;

    let accepted_hits = r.positional("accepted_hits", |r| {
        let tophat = CallId::new(Stage::Tophat, condition.name.as_str());
        Ok(r.upstream_artifact(&tophat, ACCEPTED_HITS)?
            .display()
            .to_string())
    })?;

    Ok(vec![accepted_hits])
}
