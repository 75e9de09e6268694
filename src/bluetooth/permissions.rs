/// Platform permission checks and adapter acquisition
use async_trait::async_trait;
use log::{error, info};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::bluetooth::AdapterHandle;
use crate::error::{BleError, InitError};

/// First Android API level with the dedicated Bluetooth runtime permissions (Android 12)
const ANDROID_BLUETOOTH_PERMISSIONS_API: u32 = 31;

const LEGACY_PERMISSIONS: &[Permission] = &[Permission::AccessFineLocation];
const MODERN_PERMISSIONS: &[Permission] = &[
    Permission::BluetoothScan,
    Permission::BluetoothConnect,
    Permission::AccessFineLocation,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android { api_level: u32 },
    Ios,
    Linux,
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.split_once(':') {
            Some(("android", level)) => level
                .trim()
                .parse()
                .map(|api_level| Platform::Android { api_level })
                .map_err(|e| format!("invalid Android API level '{}': {}", level, e)),
            None if s == "ios" => Ok(Platform::Ios),
            None if s == "linux" => Ok(Platform::Linux),
            _ => Err(format!("unknown platform '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    AccessFineLocation,
    BluetoothScan,
    BluetoothConnect,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Permission::AccessFineLocation => "android.permission.ACCESS_FINE_LOCATION",
            Permission::BluetoothScan => "android.permission.BLUETOOTH_SCAN",
            Permission::BluetoothConnect => "android.permission.BLUETOOTH_CONNECT",
        };
        f.write_str(name)
    }
}

/// Minimal permission set needed before BLE can be used on `platform`
pub fn required_permissions(platform: Platform) -> &'static [Permission] {
    match platform {
        Platform::Android { api_level } if api_level < ANDROID_BLUETOOTH_PERMISSIONS_API => {
            LEGACY_PERMISSIONS
        }
        Platform::Android { .. } => MODERN_PERMISSIONS,
        Platform::Ios | Platform::Linux => &[],
    }
}

/// Asks the user (or the OS) for runtime permissions
#[async_trait]
pub trait PermissionPrompt: Send + Sync {
    /// Returns the grant decision for each requested permission
    async fn request(&self, permissions: &[Permission])
        -> Result<HashMap<Permission, bool>, InitError>;
}

/// Grants everything; for hosts where the OS gates Bluetooth itself
pub struct AutoGrant;

#[async_trait]
impl PermissionPrompt for AutoGrant {
    async fn request(
        &self,
        permissions: &[Permission],
    ) -> Result<HashMap<Permission, bool>, InitError> {
        Ok(permissions.iter().map(|p| (*p, true)).collect())
    }
}

/// Check permissions, then open the adapter
///
/// A partial grant counts as a denial. On any failure the adapter is never
/// opened and the caller should treat Bluetooth as "not ready".
pub async fn initialize<F, Fut>(
    platform: Platform,
    prompt: &dyn PermissionPrompt,
    open_adapter: F,
) -> Result<AdapterHandle, InitError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<AdapterHandle, BleError>>,
{
    let required = required_permissions(platform);

    if !required.is_empty() {
        info!("Requesting permissions: {:?}", required);
        let grants = prompt.request(required).await?;

        let denied: Vec<Permission> = required
            .iter()
            .filter(|p| !grants.get(*p).copied().unwrap_or(false))
            .copied()
            .collect();

        if !denied.is_empty() {
            error!("Bluetooth permissions denied: {:?}", denied);
            return Err(InitError::PermissionDenied(denied));
        }
    }

    match open_adapter().await {
        Ok(adapter) => {
            info!("Bluetooth adapter ready");
            Ok(adapter)
        }
        Err(e) => {
            error!("Bluetooth initialization failed: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::fake::FakeCentral;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedPrompt {
        denied: Vec<Permission>,
        requests: Mutex<Vec<Vec<Permission>>>,
    }

    impl ScriptedPrompt {
        fn denying(denied: &[Permission]) -> Self {
            ScriptedPrompt {
                denied: denied.to_vec(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Vec<Permission>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PermissionPrompt for ScriptedPrompt {
        async fn request(
            &self,
            permissions: &[Permission],
        ) -> Result<HashMap<Permission, bool>, InitError> {
            self.requests.lock().unwrap().push(permissions.to_vec());
            Ok(permissions
                .iter()
                .map(|p| (*p, !self.denied.contains(p)))
                .collect())
        }
    }

    struct FailingPrompt;

    #[async_trait]
    impl PermissionPrompt for FailingPrompt {
        async fn request(
            &self,
            _permissions: &[Permission],
        ) -> Result<HashMap<Permission, bool>, InitError> {
            Err(InitError::Prompt("activity not attached".to_string()))
        }
    }

    type OpenAdapter = std::future::Ready<Result<AdapterHandle, BleError>>;

    fn fake_adapter(opened: &Arc<AtomicUsize>) -> impl FnOnce() -> OpenAdapter {
        let opened = opened.clone();
        move || {
            opened.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(Arc::new(FakeCentral::new()) as AdapterHandle))
        }
    }

    #[test]
    fn test_decision_table() {
        assert_eq!(
            required_permissions(Platform::Android { api_level: 30 }),
            &[Permission::AccessFineLocation]
        );
        assert_eq!(
            required_permissions(Platform::Android { api_level: 31 }),
            &[
                Permission::BluetoothScan,
                Permission::BluetoothConnect,
                Permission::AccessFineLocation
            ]
        );
        assert!(required_permissions(Platform::Ios).is_empty());
        assert!(required_permissions(Platform::Linux).is_empty());
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("linux".parse::<Platform>(), Ok(Platform::Linux));
        assert_eq!("iOS".parse::<Platform>(), Ok(Platform::Ios));
        assert_eq!(
            "android:29".parse::<Platform>(),
            Ok(Platform::Android { api_level: 29 })
        );
        assert!("android".parse::<Platform>().is_err());
        assert!("windows".parse::<Platform>().is_err());
    }

    #[tokio::test]
    async fn test_no_prompt_needed_on_ios() {
        let prompt = ScriptedPrompt::denying(&[]);
        let opened = Arc::new(AtomicUsize::new(0));

        let result = initialize(Platform::Ios, &prompt, fake_adapter(&opened)).await;

        assert!(result.is_ok());
        assert!(prompt.requests().is_empty());
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_legacy_android_requests_location_only() {
        let prompt = ScriptedPrompt::denying(&[]);
        let opened = Arc::new(AtomicUsize::new(0));

        let result = initialize(
            Platform::Android { api_level: 30 },
            &prompt,
            fake_adapter(&opened),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(prompt.requests(), vec![vec![Permission::AccessFineLocation]]);
    }

    #[tokio::test]
    async fn test_partial_grant_is_denial() {
        let prompt = ScriptedPrompt::denying(&[Permission::BluetoothConnect]);
        let opened = Arc::new(AtomicUsize::new(0));

        let result = initialize(
            Platform::Android { api_level: 33 },
            &prompt,
            fake_adapter(&opened),
        )
        .await;

        match result {
            Err(InitError::PermissionDenied(denied)) => {
                assert_eq!(denied, vec![Permission::BluetoothConnect])
            }
            other => panic!("expected denial, got {:?}", other.map(|_| ())),
        }
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompt_and_adapter_failures_are_not_ready() {
        let opened = Arc::new(AtomicUsize::new(0));
        let result = initialize(
            Platform::Android { api_level: 31 },
            &FailingPrompt,
            fake_adapter(&opened),
        )
        .await;
        assert!(matches!(result, Err(InitError::Prompt(_))));
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        let result = initialize(Platform::Linux, &AutoGrant, || async {
            Err::<AdapterHandle, _>(BleError::Platform("no adapter".to_string()))
        })
        .await;
        assert!(matches!(result, Err(InitError::Adapter(_))));
    }
}
