use bibrecon::error::BatchError;
use bibrecon::runner;

fn main() -> Result<(), BatchError> {
    simple_logger::init_with_level(log::Level::Info).unwrap();

    let mut args = std::env::args();
    args.next();

    if let (Some(comm), Some(root_str)) = (args.next(), args.next()) {
        runner(&comm, &root_str, args.next())?;
    } else {
        return Err(BatchError::Usage(
            "bibrecon <curate|probe> <root> [input]".to_string(),
        ));
    }
    Ok(())
}
