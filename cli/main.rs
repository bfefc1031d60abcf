use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use myfs::{attest::HostFingerprint, config::Config, engine::MyFs, MyFsError};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// MyFS - password-protected single-file container bound to this machine
#[derive(Parser)]
#[command(name = "myfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "myfs.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new container (data volume + encrypted metadata volume)
    Format {
        /// Data volume path
        #[arg(short, long, default_value = "./myfs.dat")]
        data_path: String,

        /// Metadata volume path
        #[arg(short, long, default_value = "./myfs.meta")]
        metadata_path: String,
    },

    /// Import a file into the container
    Import {
        /// Input file to import
        input: PathBuf,

        /// Logical name inside the container (defaults to input filename)
        #[arg(short, long)]
        name: Option<String>,

        /// Seal the payload under a fresh per-file key
        #[arg(short, long)]
        encrypt: bool,
    },

    /// Export a stored file
    Export {
        /// Logical name inside the container
        name: String,

        /// Output file path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove a stored file (payload bytes remain as an unreferenced hole)
    Remove {
        /// Logical name to remove
        name: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// List stored files
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Change the filesystem password
    Passwd,

    /// Protect one stored file with its own password
    FilePasswd {
        /// Logical name to re-encrypt
        name: String,
    },

    /// Show container status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured logging
    // Use RUST_LOG environment variable to control log level (e.g., RUST_LOG=info,myfs=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "MyFS starting");

    match cli.command {
        Commands::Format {
            data_path,
            metadata_path,
        } => cmd_format(&cli.config, &data_path, &metadata_path).await,

        Commands::Import {
            input,
            name,
            encrypt,
        } => cmd_import(&cli.config, &input, name.as_deref(), encrypt).await,

        Commands::Export { name, output } => cmd_export(&cli.config, &name, output.as_ref()).await,

        Commands::Remove { name, yes } => cmd_remove(&cli.config, &name, yes).await,

        Commands::List { verbose } => cmd_list(&cli.config, verbose).await,

        Commands::Passwd => cmd_passwd(&cli.config).await,

        Commands::FilePasswd { name } => cmd_file_passwd(&cli.config, &name).await,

        Commands::Status => cmd_status(&cli.config).await,
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("reading password")
}

fn prompt_new_password() -> Result<String> {
    let first = prompt_password("New password: ")?;
    let second = prompt_password("Repeat new password: ")?;
    if first != second {
        anyhow::bail!("passwords do not match");
    }
    Ok(first)
}

/// Load config and unlock the container, translating the common engine
/// failures into actionable messages.
async fn unlock(config_path: &str) -> Result<MyFs> {
    let cfg = Config::load(config_path)?;
    let password = prompt_password("Password: ")?;

    match MyFs::open(&cfg, &password, &HostFingerprint).await {
        Ok(fs) => Ok(fs),
        Err(MyFsError::WrongPassword) => {
            anyhow::bail!("wrong password for '{}'", cfg.metadata_path)
        }
        Err(MyFsError::MachineMismatch { expected, found }) => anyhow::bail!(
            "this container was created on another machine (expected '{}', this machine is '{}')",
            expected,
            found
        ),
        Err(e) => Err(e).context("opening container"),
    }
}

/// Create a new container and write the config file
async fn cmd_format(config_path: &str, data_path: &str, metadata_path: &str) -> Result<()> {
    println!("Formatting MyFS container...");

    let cfg = Config::new(data_path, metadata_path);
    cfg.validate()?;

    // Check if config already exists
    if fs::try_exists(config_path).await.unwrap_or(false) {
        anyhow::bail!(
            "Configuration file '{}' already exists. Remove it first or use a different path.",
            config_path
        );
    }

    let password = prompt_new_password()?;

    match MyFs::format(&cfg, &password, &HostFingerprint).await {
        Ok(fs) => {
            // Write config file
            let config_json = serde_json::to_string_pretty(&cfg)?;
            fs::write(config_path, config_json)
                .await
                .with_context(|| format!("writing config to '{}'", config_path))?;

            println!("Format complete!");
            println!("Config:   {}", config_path);
            println!("Data:     {}", data_path);
            println!("Metadata: {}", metadata_path);
            println!("Machine:  {}", fs.machine_id().await);
            println!();
            println!("IMPORTANT: Keep your password safe!");
            println!("Without it, the metadata volume cannot be decrypted and all");
            println!("stored files are unrecoverable.");
            Ok(())
        }
        Err(MyFsError::AlreadyFormatted(path)) => {
            anyhow::bail!("'{}' already exists; refusing to overwrite", path)
        }
        Err(e) => Err(e).context("formatting container"),
    }
}

/// Import a file into the container
async fn cmd_import(
    config_path: &str,
    input: &PathBuf,
    name: Option<&str>,
    encrypt: bool,
) -> Result<()> {
    // Determine logical name
    let logical_name = match name {
        Some(n) => n.to_string(),
        None => input
            .file_name()
            .context("input file has no filename")?
            .to_string_lossy()
            .to_string(),
    };

    let content = fs::read(input)
        .await
        .with_context(|| format!("reading {:?}", input))?;

    let myfs = unlock(config_path).await?;

    let mode_str = if encrypt { " (encrypted)" } else { "" };
    let pb = create_spinner(&format!("Importing {}{}", logical_name, mode_str));

    let result = myfs
        .import_file(
            &logical_name,
            &content,
            &input.to_string_lossy(),
            encrypt,
        )
        .await;

    pb.finish_and_clear();

    match result {
        Ok(()) => {
            println!(
                "Imported '{}' ({} bytes{})",
                logical_name,
                content.len(),
                mode_str
            );
            Ok(())
        }
        Err(MyFsError::DuplicateName(n)) => {
            anyhow::bail!("a file named '{}' is already stored", n)
        }
        Err(MyFsError::CapacityExceeded(max)) => {
            anyhow::bail!("container is full ({} files)", max)
        }
        Err(e) => Err(e).context("importing file"),
    }
}

/// Export a stored file to a path or stdout
async fn cmd_export(config_path: &str, name: &str, output: Option<&PathBuf>) -> Result<()> {
    let myfs = unlock(config_path).await?;

    let pb = create_spinner(&format!("Exporting {}", name));
    let result = myfs.export_file(name).await;
    pb.finish_and_clear();

    let content = match result {
        Ok(content) => content,
        Err(MyFsError::NotFound(n)) => anyhow::bail!("no file named '{}'", n),
        Err(MyFsError::Authentication(_)) => {
            anyhow::bail!("stored payload for '{}' failed authentication - it may be corrupted or tampered with", name)
        }
        Err(e) => return Err(e).context("exporting file"),
    };

    match output {
        Some(path) => {
            fs::write(path, &content)
                .await
                .with_context(|| format!("writing {:?}", path))?;
            println!("Exported '{}' to {:?} ({} bytes)", name, path, content.len());
        }
        None => {
            io::stdout().write_all(&content)?;
        }
    }

    Ok(())
}

/// Remove a stored file
async fn cmd_remove(config_path: &str, name: &str, yes: bool) -> Result<()> {
    if !yes {
        print!("Remove '{}' from the container? [y/N] ", name);
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let myfs = unlock(config_path).await?;

    match myfs.delete_file(name).await {
        Ok(()) => {
            println!("Removed '{}'", name);
            Ok(())
        }
        Err(MyFsError::NotFound(n)) => anyhow::bail!("no file named '{}'", n),
        Err(e) => Err(e).context("removing file"),
    }
}

/// List stored files
async fn cmd_list(config_path: &str, verbose: bool) -> Result<()> {
    let myfs = unlock(config_path).await?;
    let files = myfs.list_files().await;

    if files.is_empty() {
        println!("No files stored.");
        return Ok(());
    }

    if verbose {
        println!("{:<30} {:>12} {:>10}  {}", "NAME", "SIZE", "ENCRYPTED", "IMPORTED");
        for (name, _, _) in &files {
            let entry = myfs.stat(name).await?;
            println!(
                "{:<30} {:>12} {:>10}  {}",
                entry.name,
                entry.size,
                if entry.is_encrypted { "yes" } else { "no" },
                entry.creation_time
            );
        }
    } else {
        for (name, size, encrypted) in &files {
            let marker = if *encrypted { "*" } else { " " };
            println!("{} {:<30} {} bytes", marker, name, size);
        }
        println!();
        println!("{} file(s), * = encrypted", files.len());
    }

    Ok(())
}

/// Change the filesystem password
async fn cmd_passwd(config_path: &str) -> Result<()> {
    let cfg = Config::load(config_path)?;
    let old_password = prompt_password("Current password: ")?;

    let myfs = match MyFs::open(&cfg, &old_password, &HostFingerprint).await {
        Ok(fs) => fs,
        Err(MyFsError::WrongPassword) => anyhow::bail!("wrong password"),
        Err(e) => return Err(e).context("opening container"),
    };

    let new_password = prompt_new_password()?;

    match myfs.change_fs_password(&old_password, &new_password).await {
        Ok(()) => {
            println!("Filesystem password changed.");
            Ok(())
        }
        Err(MyFsError::WrongPassword) => anyhow::bail!("wrong password"),
        Err(e) => Err(e).context("changing filesystem password"),
    }
}

/// Re-encrypt one stored file under its own password
async fn cmd_file_passwd(config_path: &str, name: &str) -> Result<()> {
    let myfs = unlock(config_path).await?;

    let file_password = prompt_new_password()?;

    let pb = create_spinner(&format!("Re-encrypting {}", name));
    let result = myfs.set_file_password(name, &file_password).await;
    pb.finish_and_clear();

    match result {
        Ok(()) => {
            println!("'{}' is now sealed under its own password-derived key.", name);
            Ok(())
        }
        Err(MyFsError::NotFound(n)) => anyhow::bail!("no file named '{}'", n),
        Err(e) => Err(e).context("setting file password"),
    }
}

/// Show container status and statistics
async fn cmd_status(config_path: &str) -> Result<()> {
    let cfg = Config::load(config_path)?;
    let myfs = unlock(config_path).await?;
    let status = myfs.status().await?;

    let payload_region = status.container_len.saturating_sub(status.header_size);
    let hole_bytes = payload_region.saturating_sub(status.live_bytes);

    println!("MyFS container status");
    println!("  Data volume:     {}", cfg.data_path);
    println!("  Metadata volume: {}", cfg.metadata_path);
    println!("  Machine:         {}", myfs.machine_id().await);
    println!("  Files:           {}", status.file_count);
    println!("  Container size:  {} bytes ({} header)", status.container_len, status.header_size);
    println!("  Live payload:    {} bytes", status.live_bytes);
    println!("  Holes:           {} bytes (reclaimable by a future compaction)", hole_bytes);

    Ok(())
}
