use super::resolve::Resolver;
use crate::condition::Condition;
use crate::errors::{CallError, ConfigError};

pub(super) fn resolve(r: &mut Resolver<'_>, condition: &Condition) -> Result<Vec<String>, CallError> {
    r.option("G", |_| Ok(Some(condition.gtf_annotation.clone())))?;

    let index = r.positional("bowtie2_index", |r| {
        let dir = r
            .config
            .run
            .bowtie_indexes_dir
            .as_ref()
            .ok_or_else(|| ConfigError::MissingSection {
                section: "run_options.bowtie_indexes_dir".to_string(),
            })?;
        Ok(dir.join(&condition.bowtie2_index).display().to_string())
    })?;
    let left_reads = r.positional("left_reads", |_| Ok(condition.left_reads.join(",")))?;
    let right_reads = r.positional("right_reads", |_| Ok(condition.right_reads.join(",")))?;

    Ok(vec![index, left_reads, right_reads])
}
