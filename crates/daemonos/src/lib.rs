/*!
DaemonOS desktop core - resource accounting, scheduling and window management
for a simulated desktop shell.

```ignore
use daemonos::{AppId, AppRegistry, Desktop};

// Create the shell (frame driver starts automatically)
let desktop = Desktop::builder()
  .registry(AppRegistry::from_json(manifest_json)?)
  .build();

// Launch apps and manipulate windows
let window = desktop.open_app(&AppId::from("chess"))?;
desktop.wm().tile();

// Apps account for the memory they hold
let token = desktop.tracker().claim("chess", "engine-cache", 50 << 20, "tables");

// Subscribe to events
let mut events = desktop.subscribe();
while let Ok(event) = events.recv().await {
    // handle event
}

// The driver stops when the last clone is dropped
drop(desktop);
```
*/

mod driver;
mod shell;

pub mod audio;
pub mod config;
pub mod lifecycle;
pub mod monitor;
pub mod perf;
pub mod registry;
pub mod resources;
pub mod storage;
pub mod wm;

mod types;
pub use types::*;

pub use crate::audio::{AudioHandle, AudioRouter};
pub use crate::config::Settings;
pub use crate::driver::{frame_iteration, DriverConfig};
pub use crate::lifecycle::{
  AppHooks, AppInfo, AppLifecycle, AppStats, AppStatus, AppSummary, LoopConfig, LoopController,
};
pub use crate::monitor::{format_bytes, SystemMonitor, SystemReport};
pub use crate::perf::{HeapSample, MemoryProbe, NoMemoryProbe, PerfMonitor, PerfStats};
pub use crate::registry::{AppManifest, AppRegistry};
pub use crate::resources::{ResourceTotals, ResourceTracker};
pub use crate::shell::{AppLaunch, AppOpener, Desktop, DesktopBuilder, Menu, MenuItem};
pub use crate::storage::{DirStorage, MemoryStorage, Storage};
pub use crate::wm::{GenieTween, TrashItem, WindowManager};
