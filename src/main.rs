//! Demonstration client: writes three keys, reads one back and lists the
//! whole keyspace.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use txnkv::codec::{KeySelector, Printable};
use txnkv::{boot, Cluster, Database, RangeOption, StreamingMode};

const DEFAULT_CLUSTER_FILE: &str = "/usr/local/etc/txnkv/txnkv.cluster";

#[derive(Parser)]
#[command(name = "txnkv-demo")]
#[command(about = "Exercise the txnkv client API against a cluster")]
struct Args {
    /// Path to the cluster file
    #[arg(env = "TXNKV_CLUSTER_FILE", default_value = DEFAULT_CLUSTER_FILE)]
    cluster_file: PathBuf,
}

async fn create_data(db: &Database) -> txnkv::Result<()> {
    db.run(|tr| async move {
        tr.set(b"Test Key1", b"Test Value1");
        tr.set(b"Test Key2", b"Test Value2");
        tr.set(b"Test Key3", b"Test Value3");
        Ok(())
    })
    .await
}

async fn read_data(db: &Database) -> txnkv::Result<()> {
    let key = b"Test Key2";
    let value = db.run(|tr| async move { tr.get(key, false).await }).await?;
    match value {
        Some(v) => println!("Got Value for {}: '{}'", Printable(key), Printable(&v)),
        None => println!("No value for {}", Printable(key)),
    }
    Ok(())
}

async fn read_all_data(db: &Database) -> txnkv::Result<()> {
    let opt = RangeOption::new(
        KeySelector::last_less_than(b"".to_vec()),
        KeySelector::last_less_than(b"".to_vec()) + 10,
    )
    .mode(StreamingMode::WantAll);
    let kvs = db
        .run(|tr| {
            let opt = opt.clone();
            async move { tr.get_range_all(opt, false).await }
        })
        .await?;
    println!("Key/Value Pairs Returned: {}", kvs.len());
    for kv in kvs {
        println!("{}: '{}'", Printable(&kv.key), Printable(&kv.value));
    }
    Ok(())
}

async fn real_main(args: Args) -> txnkv::Result<()> {
    println!("Starting txnkv client API test");
    let network = boot()?;
    println!("Got network");

    let cluster = Cluster::open(&network, &args.cluster_file).await?;
    println!("Got cluster");
    let db = cluster.create_database("DB")?;
    println!("Got database");

    create_data(&db).await?;
    read_data(&db).await?;
    read_all_data(&db).await?;

    network.stop()?;
    println!("Program done. Now exiting...");
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    // The network guard lives inside `real_main`, so it is stopped before
    // the process exits on every path.
    if let Err(e) = real_main(args).await {
        eprintln!("Error ({}): {}", e.code(), e);
        process::exit(e.code());
    }
}
