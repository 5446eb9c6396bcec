use clap::Parser;
use service::Manager;
use xdmcp_manager::{config, handler, server};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Info)?;

    let args = config::Args::parse();
    let cfg = config::Config::load(&args)?;
    let port = cfg.network.port;
    let use_multicast = cfg.network.use_multicast;
    let multicast_address = cfg.network.multicast_address;
    let manager_config = cfg.into_manager_config();

    let socket = server::bind(port).await?;
    log::info!("listening on {}", socket.local_addr()?);

    if use_multicast {
        server::join_multicast(&socket, multicast_address);
        log::info!("joined multicast group {multicast_address}");
    }

    let manager = Manager::new(manager_config, handler::Handler);
    server::run(socket, manager).await?;

    Ok(())
}
