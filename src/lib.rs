use log::info;

//gen
pub mod common;
pub mod counter;
pub mod error;
pub mod graph;
pub mod store;
//spec
pub mod curator;
pub mod finder;
pub mod indexes;
pub mod ra;
pub mod rows;
pub mod vi_patterns;
pub mod vvi;

use common::Stowage;
use counter::FileCounter;
use curator::Curator;
use error::BatchError;
use finder::ResourceFinder;
use rows::CleanedRow;
use store::{DumpStore, RetryingStore};

pub fn runner(comm: &str, root_str: &str, in_root_o: Option<String>) -> Result<(), BatchError> {
    let stowage = Stowage::new(root_str);
    if comm == "curate" {
        let in_path = in_root_o
            .ok_or_else(|| BatchError::Usage("curate <root> <input.csv>".to_string()))?;
        curate(&stowage, &in_path)?;
    } else if comm == "probe" {
        let token = in_root_o
            .ok_or_else(|| BatchError::Usage("probe <root> <scheme:literal>".to_string()))?;
        probe(&stowage, &token)?;
    } else {
        return Err(BatchError::Usage(format!("unknown command: {}", comm)));
    }
    Ok(())
}

/// One full batch: read rows, curate against the store, emit every
/// index and the enriched rows.
fn curate(stowage: &Stowage, in_path: &str) -> Result<(), BatchError> {
    let mut rdr = csv::Reader::from_path(in_path)?;
    let mut input: Vec<CleanedRow> = vec![];
    for rec in rdr.deserialize() {
        input.push(rec?);
    }
    info!("read {} rows from {}", input.len(), in_path);

    let client = RetryingStore::new(DumpStore::load(&stowage.dump_path())?);
    let finder = ResourceFinder::new(Box::new(client));
    let counter = FileCounter::new(&stowage.counters);
    let mut curator = Curator::new(finder, &counter);
    curator.curate(input)?;
    indexes::write_all(stowage, &curator)?;
    Ok(())
}

/// Point lookup against the dump, a debugging aid.
fn probe(stowage: &Stowage, token: &str) -> Result<(), BatchError> {
    let (scheme, value) = token
        .split_once(':')
        .ok_or_else(|| BatchError::Usage(format!("not a scheme:literal token: {}", token)))?;
    let client = DumpStore::load(&stowage.dump_path())?;
    let mut finder = ResourceFinder::new(Box::new(client));
    for (meta, title, _) in finder.retrieve_br_from_id(scheme, value)? {
        println!("br/{}\t{}", meta, title);
    }
    for (meta, name, _) in finder.retrieve_ra_from_id(scheme, value, false)? {
        println!("ra/{}\t{}", meta, name);
    }
    Ok(())
}
