use env_logger::Env;
use tris_baker::{convert, convert_config::ConvertConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let config = ConvertConfig::from_args(std::env::args().skip(1))?;
    let written = convert(&config)?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}
