use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use chainseal_batch::BatchVerifier;
use chainseal_core::{
    AsymmetricKey, CbcKey, HashAlgorithm, Key, Suite, SymmetricAlgorithm, SymmetricKey,
};
use chainseal_pki::{Cert, CertBasicInfo, CryptoSuite, Identity};
use clap::Parser;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod cli;
mod config;

use cli::{Cli, Commands, SubjectArgs};
use config::{generate_sample_config, NodeConfig};

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            output,
            data_dir,
            algorithm,
        } => init_config(output, data_dir, &algorithm)?,
        Commands::Keygen {
            algorithm,
            output,
            public_output,
        } => generate_key(&algorithm, output, public_output)?,
        Commands::Ca {
            algorithm,
            key,
            subject,
            output,
        } => create_root(&algorithm, key, subject, output)?,
        Commands::Issue {
            algorithm,
            ca_cert,
            ca_key,
            subject_key,
            subject,
            intermediate,
            output,
        } => issue_cert(
            &algorithm,
            ca_cert,
            ca_key,
            subject_key,
            subject,
            intermediate,
            output,
        )?,
        Commands::Check {
            algorithm,
            cert,
            roots,
        } => check_chain(&algorithm, cert, roots)?,
        Commands::Sign {
            config,
            input,
            batch,
        } => sign_file(config, input, batch)?,
        Commands::Verify {
            algorithm,
            cert,
            input,
            signature,
        } => verify_file(&algorithm, cert, input, &signature)?,
        Commands::Encrypt {
            algorithm,
            key,
            input,
            output,
        } => encrypt_file(&algorithm, key, input, output)?,
        Commands::Decrypt {
            algorithm,
            key,
            input,
            output,
        } => decrypt_file(&algorithm, &key, input, output)?,
        Commands::Hash { algorithm, input } => hash_file(&algorithm, input)?,
        Commands::BenchBatch { count, config } => bench_batch(count, config)?,
    }

    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn subject_info(subject: SubjectArgs) -> CertBasicInfo {
    CertBasicInfo {
        organization: subject.org,
        organizational_unit: subject.ou,
        country: subject.country,
        province: subject.province,
        locality: subject.locality,
        common_name: subject.cn,
        validation_years: subject.years,
        max_path_len: subject.path_len,
    }
}

/// Initialize a new configuration file
fn init_config(output: PathBuf, data_dir: PathBuf, algorithm: &str) -> Result<()> {
    let suite = Suite::from_str(algorithm)?;
    info!("Generating sample configuration for {}", suite);

    let config = generate_sample_config(&data_dir, suite);
    config.save(&output)?;

    info!("Configuration saved to {:?}", output);

    println!("\nConfiguration file created: {}", output.display());
    println!("Create the identity it points to with:");
    println!(
        "  chainseal keygen -a {} -o {}",
        suite,
        config.identity.key_path.display()
    );
    println!(
        "  chainseal issue -a {} --ca-cert <ca.crt> --ca-key <ca.key> --subject-key {} --cn <name> -o {}",
        suite,
        config.identity.key_path.display(),
        config.identity.cert_path.display()
    );

    Ok(())
}

/// Generate a new private key
fn generate_key(algorithm: &str, output: PathBuf, public_output: Option<PathBuf>) -> Result<()> {
    let suite = CryptoSuite::new(algorithm)?;
    let key = suite.keys.generate_key()?;

    fs::write(&output, key.to_pem())?;
    info!("Private key saved to {:?}", output);

    let public = key.public_key()?;
    if let Some(path) = public_output {
        fs::write(&path, public.to_pem())?;
        info!("Public key saved to {:?}", path);
    }

    println!("Generated {} key", suite.suite());
    println!("  Public point: {}", hex::encode(public.uncompressed_point()));
    println!("\nWARNING: Keep your private key safe! Do not share it with anyone.");

    Ok(())
}

/// Create a self-signed root certificate
fn create_root(algorithm: &str, key: PathBuf, subject: SubjectArgs, output: PathBuf) -> Result<()> {
    let suite = CryptoSuite::new(algorithm)?;
    let key = suite.keys.key_from_pem(&read(&key)?)?;
    let cert = suite
        .certs
        .generate_self_sign_cert(&subject_info(subject), &key)?;

    fs::write(&output, cert.to_pem()?)?;
    info!("Root certificate saved to {:?}", output);
    print_cert(&cert);

    Ok(())
}

/// Issue an intermediate or leaf certificate
fn issue_cert(
    algorithm: &str,
    ca_cert: PathBuf,
    ca_key: PathBuf,
    subject_key: PathBuf,
    subject: SubjectArgs,
    intermediate: bool,
    output: PathBuf,
) -> Result<()> {
    let suite = CryptoSuite::new(algorithm)?;
    let ca_cert = suite.certs.cert_from_pem(&read(&ca_cert)?)?;
    let ca_key = suite.keys.key_from_pem(&read(&ca_key)?)?;
    let subject_key = suite.keys.key_from_pem(&read(&subject_key)?)?.public_key()?;
    let info = subject_info(subject);

    let cert = if intermediate {
        suite
            .certs
            .generate_middle_ca_cert(&info, &subject_key, &ca_key, &ca_cert)?
    } else {
        suite.certs.generate_cert(&info, &subject_key, &ca_key, &ca_cert)?
    };

    fs::write(&output, cert.chain_pem()?)?;
    info!("Certificate saved to {:?}", output);
    print_cert(&cert);

    Ok(())
}

fn print_cert(cert: &Cert) {
    println!("Certificate:");
    println!("  Subject:     {}", cert.common_name().unwrap_or_default());
    println!("  Issuer:      {}", cert.issuer_common_name().unwrap_or_default());
    println!("  Serial:      {}", cert.serial_number());
    println!("  CA:          {}", cert.is_ca());
    println!("  Expires:     {}", cert.expire_time());
    println!("  Fingerprint: {}", cert.fingerprint());
}

/// Validate a certificate against trusted roots
fn check_chain(algorithm: &str, cert: PathBuf, roots: Vec<PathBuf>) -> Result<()> {
    let suite = CryptoSuite::new(algorithm)?;
    let cert = suite.certs.cert_from_pem(&read(&cert)?)?;
    let roots = roots
        .iter()
        .map(|path| Ok(suite.certs.cert_from_pem(&read(path)?)?))
        .collect::<Result<Vec<Cert>>>()?;

    match cert.check_validation(&roots) {
        Ok(org) => {
            println!(
                "Certificate {} is trusted (root organization: {})",
                cert.common_name().unwrap_or_default(),
                if org.is_empty() { "<none>" } else { org.as_str() }
            );
            Ok(())
        }
        Err(e) => {
            error!("Chain validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Sign a file with the configured identity
fn sign_file(config_path: PathBuf, input: PathBuf, batch: bool) -> Result<()> {
    if !config_path.exists() {
        error!(
            "Configuration file not found: {:?}. Run 'chainseal init' to create one.",
            config_path
        );
        bail!("Configuration file not found");
    }
    let config = NodeConfig::load(&config_path)?;
    let identity = Identity::from_files(
        config.identity.algorithm.as_str(),
        &config.identity.cert_path,
        &config.identity.key_path,
    )?;

    let data = read(&input)?;
    let signature = if batch {
        identity.sign_for_batch_verify(&data)?
    } else {
        identity.sign(&data)?
    };

    println!("{}", STANDARD.encode(signature));
    Ok(())
}

/// Verify a signature with a certificate's public key
fn verify_file(algorithm: &str, cert: PathBuf, input: PathBuf, signature: &str) -> Result<()> {
    let suite = CryptoSuite::new(algorithm)?;
    let cert = suite.certs.cert_from_pem(&read(&cert)?)?;
    let signature = STANDARD.decode(signature.trim())?;
    let data = read(&input)?;

    cert.verify(&data, &signature)?;
    println!(
        "Signature by {} is valid",
        cert.common_name().unwrap_or_default()
    );
    Ok(())
}

fn encrypt_file(
    algorithm: &str,
    key: Option<String>,
    input: PathBuf,
    output: PathBuf,
) -> Result<()> {
    let algorithm = SymmetricAlgorithm::from_str(algorithm)?;
    let key = match key {
        Some(encoded) => CbcKey::from_base64(algorithm, &encoded)?,
        None => {
            let key = CbcKey::generate(algorithm)?;
            println!("Generated {} key: {}", algorithm, key.key_base64());
            key
        }
    };

    let ciphertext = key.encrypt(&read(&input)?)?;
    fs::write(&output, STANDARD.encode(ciphertext))?;
    info!("Ciphertext saved to {:?}", output);
    Ok(())
}

fn decrypt_file(algorithm: &str, key: &str, input: PathBuf, output: PathBuf) -> Result<()> {
    let algorithm = SymmetricAlgorithm::from_str(algorithm)?;
    let key = CbcKey::from_base64(algorithm, key)?;

    let encoded = fs::read_to_string(&input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    let plaintext = key.decrypt(&STANDARD.decode(encoded.trim())?)?;
    fs::write(&output, plaintext)?;
    info!("Plaintext saved to {:?}", output);
    Ok(())
}

fn hash_file(algorithm: &str, input: PathBuf) -> Result<()> {
    let algorithm = HashAlgorithm::from_str(algorithm)?;
    let digest = algorithm.hash_file(&input)?;
    println!("{}  {}", digest, input.display());
    Ok(())
}

/// Sign `count` random messages and time individual against batch verification
fn bench_batch(count: usize, config: Option<PathBuf>) -> Result<()> {
    if count == 0 {
        bail!("count must be positive");
    }
    let config = match config {
        Some(path) => NodeConfig::load(&path)?,
        None => NodeConfig::default(),
    };

    let verifier = BatchVerifier::new().with_chunk_size(config.batch.chunk_size);
    let started = Instant::now();
    let sizes = verifier.populate(&config.batch.ranges());
    info!("Precomputed {} batch sizes in {:?}", sizes, started.elapsed());

    let key = Key::generate(Suite::EcdsaP256)?;
    let msgs: Vec<Vec<u8>> = (0..count)
        .map(|_| {
            let mut msg = vec![0u8; 64];
            OsRng.fill_bytes(&mut msg);
            msg
        })
        .collect();
    let sigs = msgs
        .iter()
        .map(|m| key.sign_for_batch_verify(m))
        .collect::<Result<Vec<_>, _>>()?;

    let started = Instant::now();
    for (msg, sig) in msgs.iter().zip(&sigs) {
        key.verify(msg, sig)?;
    }
    let individual = started.elapsed();

    let started = Instant::now();
    let outcome = verifier.multi_verify(&key, &msgs, &sigs)?;
    let batched = started.elapsed();

    println!("Signatures:   {}", count);
    println!("Individual:   {:?}", individual);
    println!("Batch:        {:?} ({} chunks)", batched, outcome.chunks);
    if outcome.is_all_valid() {
        println!("Result:       all valid");
    } else {
        for failure in &outcome.failed {
            println!("Chunk {:?} failed: {}", failure.range, failure.error);
        }
    }

    Ok(())
}
