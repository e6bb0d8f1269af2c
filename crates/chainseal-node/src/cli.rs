use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Chainseal - certificates, signatures and batch verification for a
/// permissioned chain
#[derive(Parser)]
#[command(name = "chainseal")]
#[command(about = "Chainseal identity and signature utilities")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a sample node configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Directory holding the node's keys and certificates
        #[arg(long, default_value = "./chainseal-data")]
        data_dir: PathBuf,

        /// Signature suite (ecdsa_with_sha256 or sm2_with_sm3)
        #[arg(short, long, default_value = "ecdsa_with_sha256")]
        algorithm: String,
    },

    /// Generate a private key
    Keygen {
        /// Signature suite
        #[arg(short, long, default_value = "ecdsa_with_sha256")]
        algorithm: String,

        /// Output file for the PKCS#8 private key
        #[arg(short, long)]
        output: PathBuf,

        /// Optional output file for the public key
        #[arg(long)]
        public_output: Option<PathBuf>,
    },

    /// Create a self-signed root CA certificate
    Ca {
        /// Signature suite
        #[arg(short, long, default_value = "ecdsa_with_sha256")]
        algorithm: String,

        /// CA private key (PEM)
        #[arg(short, long)]
        key: PathBuf,

        #[command(flatten)]
        subject: SubjectArgs,

        /// Output certificate file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Issue an intermediate CA or leaf certificate
    Issue {
        /// Signature suite
        #[arg(short, long, default_value = "ecdsa_with_sha256")]
        algorithm: String,

        /// Issuer certificate (PEM, may include its chain)
        #[arg(long)]
        ca_cert: PathBuf,

        /// Issuer private key (PEM)
        #[arg(long)]
        ca_key: PathBuf,

        /// Subject key (private or public PEM)
        #[arg(long)]
        subject_key: PathBuf,

        #[command(flatten)]
        subject: SubjectArgs,

        /// Issue an intermediate CA instead of a leaf
        #[arg(long, default_value = "false")]
        intermediate: bool,

        /// Output file for the certificate and its chain
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Validate a certificate chain against trusted roots
    Check {
        /// Signature suite
        #[arg(short, long, default_value = "ecdsa_with_sha256")]
        algorithm: String,

        /// Certificate to check (PEM bundle, leaf first)
        #[arg(short, long)]
        cert: PathBuf,

        /// Trusted root certificates
        #[arg(short, long, required = true)]
        roots: Vec<PathBuf>,
    },

    /// Sign a file with the configured identity
    Sign {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// File to sign
        #[arg(short, long)]
        input: PathBuf,

        /// Produce a signature usable for batch verification
        #[arg(long, default_value = "false")]
        batch: bool,
    },

    /// Verify a base64 signature against a certificate
    Verify {
        /// Signature suite
        #[arg(short, long, default_value = "ecdsa_with_sha256")]
        algorithm: String,

        /// Signer certificate (PEM)
        #[arg(short, long)]
        cert: PathBuf,

        /// Signed file
        #[arg(short, long)]
        input: PathBuf,

        /// Signature (base64 DER)
        #[arg(short, long)]
        signature: String,
    },

    /// Encrypt a file with AES-128 or SM4 in CBC mode
    Encrypt {
        /// Cipher (aes128 or sm4)
        #[arg(short, long, default_value = "aes128")]
        algorithm: String,

        /// Base64 key; a fresh key is generated and printed when omitted
        #[arg(short, long)]
        key: Option<String>,

        #[arg(short, long)]
        input: PathBuf,

        /// Output file for base64 ciphertext
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decrypt a base64 ciphertext file
    Decrypt {
        /// Cipher (aes128 or sm4)
        #[arg(short, long, default_value = "aes128")]
        algorithm: String,

        /// Base64 key
        #[arg(short, long)]
        key: String,

        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Hash a file
    Hash {
        /// Hash function (sha256 or sm3)
        #[arg(short, long, default_value = "sha256")]
        algorithm: String,

        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compare per-signature and batch verification timing
    BenchBatch {
        /// Number of signatures
        #[arg(short, long, default_value = "100")]
        count: usize,

        /// Optional configuration for batch sizes and chunking
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
pub struct SubjectArgs {
    /// Common name
    #[arg(long)]
    pub cn: String,

    /// Organization
    #[arg(long, default_value = "")]
    pub org: String,

    /// Organizational unit
    #[arg(long, default_value = "")]
    pub ou: String,

    /// Country
    #[arg(long, default_value = "")]
    pub country: String,

    /// Province or state
    #[arg(long, default_value = "")]
    pub province: String,

    /// Locality
    #[arg(long, default_value = "")]
    pub locality: String,

    /// Validity in years
    #[arg(long, default_value = "10")]
    pub years: u32,

    /// Maximum number of intermediate CAs below a CA certificate
    #[arg(long)]
    pub path_len: Option<u8>,
}
