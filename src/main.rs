use env_logger::Env;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::new().filter_or("JOBSH_LOG", "warn"))
        .format_timestamp(None)
        .init();

    let config = jobsh::Config::from_env()?;
    jobsh::Shell::new(config).run()?;
    Ok(())
}
