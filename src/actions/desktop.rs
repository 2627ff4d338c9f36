//! OS-level [`ActionExecutor`]: programs, processes, web, folders, Discord
//! links, power management, brightness, volume and typing.
//!
//! Every operation reports through [`ActionResult`]; nothing here panics or
//! returns early with an error.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use sysinfo::System;

use super::commands::{self, Level, MediaCommand, SystemCommand};
use super::keyboard;
use super::{ActionExecutor, ActionKind, ActionResult};
use crate::config::ActionsConfig;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

/// Open a file, folder or URL with the desktop's default handler.
fn open_target(target: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut cmd = Command::new("open");
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    };
    #[cfg(not(any(target_os = "macos", windows)))]
    let mut cmd = Command::new("xdg-open");

    cmd.arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
}

/// Start `command` through the shell without waiting for it.
fn launch(command: &str) -> io::Result<()> {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.args(["/C", command]);
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.args(["-c", command]);
        c
    };

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
}

/// Run to completion and require a zero exit status.
fn run(program: &str, args: &[&str]) -> Result<(), String> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| format!("{program}: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{program} saiu com código {:?}", status.code()))
    }
}

// ---------------------------------------------------------------------------
// Platform commands
// ---------------------------------------------------------------------------

#[cfg(windows)]
fn power_command(command: SystemCommand) -> Option<(&'static str, Vec<&'static str>)> {
    Some(match command {
        SystemCommand::Shutdown => ("shutdown", vec!["/s", "/t", "5"]),
        SystemCommand::Restart => ("shutdown", vec!["/r", "/t", "5"]),
        SystemCommand::Suspend => ("rundll32.exe", vec!["powrprof.dll,SetSuspendState", "0,1,0"]),
        SystemCommand::Lock => ("rundll32.exe", vec!["user32.dll,LockWorkStation"]),
        SystemCommand::CancelShutdown => ("shutdown", vec!["/a"]),
    })
}

#[cfg(target_os = "macos")]
fn power_command(command: SystemCommand) -> Option<(&'static str, Vec<&'static str>)> {
    match command {
        SystemCommand::Shutdown => Some((
            "osascript",
            vec!["-e", "tell app \"System Events\" to shut down"],
        )),
        SystemCommand::Restart => Some((
            "osascript",
            vec!["-e", "tell app \"System Events\" to restart"],
        )),
        SystemCommand::Suspend => Some(("pmset", vec!["sleepnow"])),
        SystemCommand::Lock => Some(("pmset", vec!["displaysleepnow"])),
        SystemCommand::CancelShutdown => None,
    }
}

#[cfg(not(any(target_os = "macos", windows)))]
fn power_command(command: SystemCommand) -> Option<(&'static str, Vec<&'static str>)> {
    Some(match command {
        SystemCommand::Shutdown => ("shutdown", vec!["-h", "+1"]),
        SystemCommand::Restart => ("shutdown", vec!["-r", "+1"]),
        SystemCommand::Suspend => ("systemctl", vec!["suspend"]),
        SystemCommand::Lock => ("loginctl", vec!["lock-session"]),
        SystemCommand::CancelShutdown => ("shutdown", vec!["-c"]),
    })
}

#[cfg(not(any(target_os = "macos", windows)))]
fn set_brightness(level: Level) -> Result<(), String> {
    let value = match level {
        Level::Raise(pct) => format!("{pct}%+"),
        Level::Lower(pct) => format!("{pct}%-"),
        Level::Set(pct) => format!("{pct}%"),
        Level::Mute | Level::Unmute => return Err("ajuste inválido".into()),
    };
    run("brightnessctl", &["set", &value])
}

#[cfg(windows)]
fn set_brightness(level: Level) -> Result<(), String> {
    let target = match level {
        Level::Raise(pct) => format!("[Math]::Min(100, $c + {pct})"),
        Level::Lower(pct) => format!("[Math]::Max(0, $c - {pct})"),
        Level::Set(pct) => pct.to_string(),
        Level::Mute | Level::Unmute => return Err("ajuste inválido".into()),
    };
    let script = format!(
        "$c = (Get-CimInstance -Namespace root/WMI -ClassName WmiMonitorBrightness).CurrentBrightness; \
         (Get-WmiObject -Namespace root/WMI -Class WmiMonitorBrightnessMethods).WmiSetBrightness(1, {target})"
    );
    run("powershell", &["-NoProfile", "-Command", &script])
}

#[cfg(target_os = "macos")]
fn set_brightness(_level: Level) -> Result<(), String> {
    Err("controle de brilho não suportado neste sistema".into())
}

fn level_message(label: &str, level: Level) -> String {
    match level {
        Level::Mute => format!("{label} mutado"),
        Level::Unmute => format!("{label} desmutado"),
        Level::Raise(pct) => format!("{label}: +{pct}%"),
        Level::Lower(pct) => format!("{label}: -{pct}%"),
        Level::Set(pct) => format!("{label}: {pct}%"),
    }
}

// ---------------------------------------------------------------------------
// DesktopController
// ---------------------------------------------------------------------------

/// The real executor.  Program names and Discord ids come from `[actions]`.
pub struct DesktopController {
    config: ActionsConfig,
}

impl DesktopController {
    pub fn new(config: ActionsConfig) -> Self {
        Self { config }
    }

    fn open_program(&self, name: &str) -> ActionResult {
        let key = name.trim().to_lowercase();
        let command = self.config.programs.get(&key).map_or(key.as_str(), String::as_str);

        let started = if Path::new(command).exists() {
            open_target(command)
        } else {
            launch(command)
        };
        match started {
            Ok(()) => ActionResult::ok(format!("Programa '{name}' aberto")),
            Err(e) => ActionResult::failed(format!("Erro ao abrir '{name}': {e}")),
        }
    }

    fn process_for(&self, name: &str) -> String {
        let key = name.trim().to_lowercase();
        match self.config.programs.get(&key) {
            Some(command) => commands::process_name(command),
            None => key,
        }
    }

    /// Kill every process matching one of `names`; returns how many died.
    fn kill_processes(names: &[String]) -> usize {
        let mut sys = System::new();
        sys.refresh_processes();
        let own = sysinfo::get_current_pid().ok();

        sys.processes()
            .values()
            .filter(|p| Some(p.pid()) != own)
            .filter(|p| names.iter().any(|n| commands::process_matches(p.name(), n)))
            .filter(|p| p.kill())
            .count()
    }

    fn close_program(&self, name: &str) -> ActionResult {
        let wanted = self.process_for(name);
        match Self::kill_processes(&[wanted]) {
            0 => ActionResult::failed(format!("Programa '{name}' não encontrado")),
            _ => ActionResult::ok(format!("Programa '{name}' fechado")),
        }
    }

    /// Closes the configured programs only.
    fn close_all(&self) -> ActionResult {
        let names: Vec<String> = self
            .config
            .programs
            .values()
            .map(|command| commands::process_name(command))
            .collect();
        let closed = Self::kill_processes(&names);
        ActionResult::ok(format!("{closed} programas fechados"))
    }

    fn volume(&self, param: &str) -> ActionResult {
        let Some(level) = commands::parse_volume(param) else {
            return ActionResult::failed("Comando de volume não reconhecido");
        };
        match keyboard::adjust_volume(level) {
            Ok(()) => ActionResult::ok(level_message("Volume", level)),
            Err(e) => ActionResult::failed(format!("Erro ao controlar volume: {e}")),
        }
    }

    fn brightness(&self, param: &str) -> ActionResult {
        let Some(level) = commands::parse_brightness(param) else {
            return ActionResult::failed("Comando de brilho não reconhecido");
        };
        match set_brightness(level) {
            Ok(()) => ActionResult::ok(level_message("Brilho", level)),
            Err(e) => ActionResult::failed(format!("Erro ao controlar brilho: {e}")),
        }
    }

    fn media(&self, param: &str) -> ActionResult {
        let Some(command) = MediaCommand::parse(param) else {
            return ActionResult::failed("Comando de mídia não reconhecido");
        };
        match keyboard::media(command) {
            Ok(()) => ActionResult::ok(command.message()),
            Err(e) => ActionResult::failed(format!("Erro ao controlar mídia: {e}")),
        }
    }

    fn system(&self, param: &str) -> ActionResult {
        let Some(command) = SystemCommand::parse(param) else {
            return ActionResult::failed("Comando de sistema não reconhecido");
        };
        let Some((program, args)) = power_command(command) else {
            return ActionResult::failed("Comando não suportado neste sistema");
        };
        log::info!("actions: {command:?} via {program}");
        match run(program, &args) {
            Ok(()) => ActionResult::ok(command.message()),
            Err(e) => ActionResult::failed(format!("Erro no comando de sistema: {e}")),
        }
    }

    fn open_url(url: &str, done: String) -> ActionResult {
        match open_target(url) {
            Ok(()) => ActionResult::ok(done),
            Err(e) => ActionResult::failed(format!("Erro ao abrir {url}: {e}")),
        }
    }

    fn open_folder(&self, name: &str) -> ActionResult {
        let Some(folder) = commands::resolve_folder(name).filter(|p| p.exists()) else {
            return ActionResult::failed(format!("Pasta não encontrada: {name}"));
        };
        let shown = folder.display().to_string();
        match open_target(&shown) {
            Ok(()) => ActionResult::ok(format!("Abrindo pasta: {shown}")),
            Err(e) => ActionResult::failed(format!("Erro ao abrir pasta: {e}")),
        }
    }

    fn type_text(&self, text: &str) -> ActionResult {
        match keyboard::type_text(text) {
            Ok(()) => {
                let preview: String = text.chars().take(30).collect();
                ActionResult::ok(format!("Digitado: {preview}"))
            }
            Err(e) => ActionResult::failed(format!("Erro ao digitar: {e}")),
        }
    }

    fn discord_dm(&self, contact: &str) -> ActionResult {
        match self.config.discord_contacts.get(&contact.trim().to_lowercase()) {
            Some(id) => Self::open_url(
                &commands::discord_dm_url(id),
                format!("Abrindo conversa com {contact}"),
            ),
            None => ActionResult::failed(format!(
                "Contato '{contact}' não encontrado nas configurações"
            )),
        }
    }

    fn discord_channel(&self, channel: &str) -> ActionResult {
        match self.config.discord_channels.get(&channel.trim().to_lowercase()) {
            Some(id) => Self::open_url(
                &commands::discord_channel_url(id),
                format!("Abrindo canal {channel}"),
            ),
            None => ActionResult::failed(format!(
                "Canal '{channel}' não encontrado nas configurações"
            )),
        }
    }

    fn time_info() -> ActionResult {
        ActionResult::ok(format!("São {}", chrono::Local::now().format("%H:%M")))
    }

    fn system_info() -> ActionResult {
        let mut sys = System::new();
        sys.refresh_cpu();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu = sys.global_cpu_info().cpu_usage();
        let used = sys.used_memory() as f64 / GIB;
        let total = sys.total_memory() as f64 / GIB;
        let pct = if total > 0.0 { used / total * 100.0 } else { 0.0 };

        ActionResult::ok(format!(
            "CPU em {cpu:.0}%, memória em {pct:.0}% ({used:.1} de {total:.1} GB)"
        ))
    }
}

impl ActionExecutor for DesktopController {
    fn execute(&self, kind: ActionKind, parameter: Option<&str>) -> ActionResult {
        let param = parameter.unwrap_or_default();
        match kind {
            ActionKind::OpenProgram => self.open_program(param),
            ActionKind::CloseProgram => self.close_program(param),
            ActionKind::CloseAll => self.close_all(),
            ActionKind::Volume => self.volume(param),
            ActionKind::Brightness => self.brightness(param),
            ActionKind::Media => self.media(param),
            ActionKind::System => self.system(param),
            ActionKind::Search => Self::open_url(
                &commands::search_url(param),
                format!("Pesquisando: {param}"),
            ),
            ActionKind::OpenSite => {
                let url = commands::site_url(param);
                Self::open_url(&url, format!("Abrindo {url}"))
            }
            ActionKind::OpenFolder => self.open_folder(param),
            ActionKind::Type => self.type_text(param),
            ActionKind::DiscordDm => self.discord_dm(param),
            ActionKind::DiscordChannel => self.discord_channel(param),
            ActionKind::TimeInfo => Self::time_info(),
            ActionKind::SystemInfo => Self::system_info(),
            ActionKind::NoAction => ActionResult::ok("Sem ação"),
        }
    }
}
