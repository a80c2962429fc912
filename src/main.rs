use clap::Parser;
use log::info;
use proton::crypto::Aes256Ctr;
use proton::node::schema::GroupSchema;
use proton::store::DirectoryStorage;
use proton::{Config, Handle, Tree};
use std::process::ExitCode;

fn demo(config: &Config) -> proton::Result<()> {
    let store = DirectoryStorage::new(&config.datadir)?;
    let mut tree: Tree<GroupSchema, DirectoryStorage, Aes256Ctr> = if config.rotation_enabled {
        Tree::new_with_seed(
            config.extent,
            config.contention,
            config.network_id.clone().into_bytes(),
            store,
            Aes256Ctr,
            config.seed,
        )?
    } else {
        Tree::new(
            config.extent,
            config.contention,
            config.network_id.clone().into_bytes(),
            store,
            Aes256Ctr,
        )?
    };

    info!("opened tree, root = {}", tree.root_handle().address);

    for id in 0u64..u64::from(config.degree.max(1) as u32) {
        let value = Handle::new(proton::Address([id as u8; 32]), proton::Secret([id as u8; 32]));
        tree.insert(id, value)?;
        info!("inserted key {id}");
    }

    for id in 0u64..u64::from(config.degree.max(1) as u32) {
        let handle = tree.search(&id)?;
        info!("searched key {id} -> {}", handle.address);
    }

    tree.check_siblings()?;
    info!("final root = {}", tree.root_handle().address);
    Ok(())
}

fn main() -> ExitCode {
    let config = Config::parse();

    if config.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    pretty_env_logger::init();

    if let Err(e) = config.validate() {
        eprintln!("invalid configuration: {e}");
        return ExitCode::from(e.exit_code() as u8);
    }

    match demo(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("proton: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
