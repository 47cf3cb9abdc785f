//! Storage tier selection

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// S3 storage class applied to newly written objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StorageClass {
    Standard,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    GlacierIr,
    Glacier,
    DeepArchive,
}

impl StorageClass {
    /// Wire name used in the `x-amz-storage-class` header
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StorageClass> for aws_sdk_s3::types::StorageClass {
    fn from(class: StorageClass) -> Self {
        use aws_sdk_s3::types::StorageClass as Aws;
        match class {
            StorageClass::Standard => Aws::Standard,
            StorageClass::StandardIa => Aws::StandardIa,
            StorageClass::OnezoneIa => Aws::OnezoneIa,
            StorageClass::IntelligentTiering => Aws::IntelligentTiering,
            StorageClass::GlacierIr => Aws::GlacierIr,
            StorageClass::Glacier => Aws::Glacier,
            StorageClass::DeepArchive => Aws::DeepArchive,
        }
    }
}
