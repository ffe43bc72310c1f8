use std::collections::BTreeMap;

use eternity_core::{CreateSaveRequest, HostId, InstanceId, InstanceSpec};
use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use crate::controller::Controller;
use crate::error::ControlError;

/// Map exchange string for the production world generator.
pub const PRODUCTION_MAP_STRING: &str = concat!(
    ">>>eNpjZGBkSGcAgwZ7IGHPwZKcn5gD5QHBAQeu5PyCgtQi3fyiV\n",
    "GRhzuSi0pRU3fxMVMWpeam5lbpJicVIihvsOTKL8vPQTWAtLsnPQ\n",
    "xUpKUpNLYaIQDB3aVFiXmZpLrpeBsZpP0/GNLTIMYDw/3oGhf//Q\n",
    "RjIegBUAMIMjA1gHYxAMRhgTc7JTEtjYFBwBGInkDQjA2O1yDr3h\n",
    "1VTgEww0HOAMj5ARQ4kwUQ8YQw/B5xSKjCGCZI5xmDwGYkBsbQEZ\n",
    "D9EFYcDggGRbAFJMjL2vt264PuxC3aMf1Z+vOSblGDPaOgq8u6D0\n",
    "To7oCQ7yJ9McGLWTBDYCfMKA8zMB/ZQqZv2jGfPgMAbe0ZWkA4RE\n",
    "OFgASQOeDMzMArwAVkLeoCEggwDzGl2MGNEHBjTwOAbzCePYYzL9\n",
    "uj+AAaEDchwORBxAkSALYS7jBHCdOh3YHSQh8lKIpQA9RsxILshB\n",
    "eHDkzBrDyPZj+YQzIhA9geaiIoDlmjgAlmYAideMMNdAwzPC+wwn\n",
    "sN8B0ZmEAOk6gtQDMIDycCMgtACDuDgZmZAgA/2DD9b9hUDAFAxn\n",
    "s8=<<<",
);

/// Autosave slots kept while players are online.
const PLAYER_ONLINE_AUTOSAVE_SLOTS: u32 = 50;

/// Map seeds stay within 53 bits so they survive a round trip through JSON numbers.
const SEED_MASK: u64 = (1 << 53) - 1;

#[derive(Debug, Clone, Default)]
pub struct NewInstance {
    pub name: String,
    pub host: HostId,
    pub username: Option<String>,
    pub token: Option<String>,
    pub game_password: Option<String>,
}

impl NewInstance {
    fn spec(&self, id: InstanceId) -> InstanceSpec {
        let mut game_settings: BTreeMap<String, Value> = BTreeMap::new();
        let optional = [
            ("username", &self.username),
            ("token", &self.token),
            ("game_password", &self.game_password),
        ];
        for (key, value) in optional {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                game_settings.insert(key.to_string(), json!(v));
            }
        }
        game_settings.insert("non_blocking_saving".to_string(), json!(true));

        InstanceSpec {
            id,
            name: self.name.clone(),
            auto_start: true,
            enable_authserver_bans: true,
            player_online_autosave_slots: Some(PLAYER_ONLINE_AUTOSAVE_SLOTS),
            disabled_plugins: vec!["player_auth".to_string()],
            game_settings,
        }
    }

    pub fn world_save_name(&self) -> String {
        format!("{}-world.zip", self.name)
    }
}

/// Create, assign, generate a fresh world for and start a new instance.
pub async fn create_instance(
    controller: &dyn Controller,
    request: &NewInstance,
) -> Result<InstanceId, ControlError> {
    let (id, seed) = {
        let mut rng = rand::rng();
        (
            rng.random_range(1..=InstanceId::from(i32::MAX)),
            rng.random::<u64>() & SEED_MASK,
        )
    };

    info!(instance = %request.name, id, "creating instance");
    controller.create_instance(&request.spec(id)).await?;
    info!(instance = %request.name, host = request.host, "assigning");
    controller.assign_instance(id, request.host).await?;

    let save = request.world_save_name();
    info!(instance = %request.name, save = %save, "creating world");
    controller
        .create_save(
            id,
            &CreateSaveRequest {
                name: save,
                seed,
                map_exchange_string: PRODUCTION_MAP_STRING.to_string(),
            },
        )
        .await?;

    info!(instance = %request.name, "starting");
    controller.start_instance(id, None).await?;
    Ok(id)
}
