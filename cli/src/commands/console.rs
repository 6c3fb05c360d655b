//! Interactive console - drive the coordinator from stdin.
//!
//! Each line is one instruction. Mutating instructions become [`Command`]s;
//! `devices`, `status`, `help` and `quit` are handled locally.

use anyhow::Result;
use scanlink_core::{Command, Coordinator, DeviceManager, Outcome, Reload, ServiceConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tracing::warn;

const HELP: &str = "\
Commands:
  reload          enumerate scanners again
  devices         list scanners from the last enumeration
  select <id>     select a scanner
  port [n]        set the port for the next start (empty: default)
  start           validate the port and start serving
  stop            stop serving
  status          show service state
  quit            stop serving and exit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(Command),
    Devices,
    Status,
    Help,
    Quit,
}

fn parse_line(line: &str) -> Result<Option<Input>, String> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "reload" | "r" => Input::Command(Command::Reload),
        "devices" | "ls" => Input::Devices,
        "select" if rest.is_empty() => return Err("usage: select <id>".to_string()),
        "select" => Input::Command(Command::SelectDevice(rest.to_string())),
        "port" => Input::Command(Command::SetPort(rest.to_string())),
        "start" => Input::Command(Command::Start),
        "stop" => Input::Command(Command::Stop),
        "status" => Input::Status,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(format!("unknown command '{other}', try 'help'")),
    };
    Ok(Some(input))
}

pub async fn run(json: bool) -> Result<()> {
    let manager = super::open_manager().await?;
    let coordinator = Coordinator::new(manager, ServiceConfig::from_env(), Handle::current());

    println!("scanlink {} - type 'help' for commands", scanlink_core::VERSION);
    reload(&coordinator).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = match parse_line(&line) {
            Ok(Some(input)) => input,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match input {
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Devices => print_devices(&coordinator),
            Input::Status => print_status(&coordinator, json)?,
            Input::Command(Command::Reload) => reload(&coordinator).await,
            Input::Command(Command::Start) => match coordinator.handle(Command::Start).await {
                Ok(_) => match super::wait_for_start(&coordinator).await {
                    Ok(()) => print_status(&coordinator, json)?,
                    Err(e) => println!("Start failed: {e}"),
                },
                Err(e) => println!("{e}"),
            },
            Input::Command(command) => {
                if let Err(e) = coordinator.handle(command).await {
                    println!("{e}");
                }
            }
        }
    }

    coordinator.shutdown().await?;
    coordinator.service().wait_stopped().await;
    Ok(())
}

async fn reload(coordinator: &Coordinator<DeviceManager>) {
    match coordinator.handle(Command::Reload).await {
        Ok(Outcome::Reload(Reload::Started(task))) => match task.await {
            Ok(Ok(_)) => print_devices(coordinator),
            Ok(Err(e)) => println!("{e}"),
            Err(e) => warn!(error = %e, "enumeration task failed"),
        },
        Ok(Outcome::Reload(Reload::InFlight)) => println!("Enumeration already running."),
        Ok(Outcome::Done) => {}
        Err(e) => println!("{e}"),
    }
}

fn print_devices(coordinator: &Coordinator<DeviceManager>) {
    let status = coordinator.status();
    if status.devices.is_empty() {
        println!("No scanners found.");
        return;
    }
    for device in &status.devices {
        let marker = if status.selected.as_deref() == Some(device.identity.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {device}");
    }
}

fn print_status(coordinator: &Coordinator<DeviceManager>, json: bool) -> Result<()> {
    let status = coordinator.status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }
    println!("State:    {}", status.state);
    println!("Port:     {}", status.port);
    if let Some(address) = &status.address {
        println!("Address:  http://{address}");
    }
    println!(
        "Device:   {}",
        status.selected.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_line("reload").unwrap(),
            Some(Input::Command(Command::Reload))
        );
        assert_eq!(
            parse_line("  START ").unwrap(),
            Some(Input::Command(Command::Start))
        );
        assert_eq!(parse_line("q").unwrap(), Some(Input::Quit));
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn test_select_keeps_identity_with_spaces() {
        assert_eq!(
            parse_line("select  Canon LiDE 220 ").unwrap(),
            Some(Input::Command(Command::SelectDevice(
                "Canon LiDE 220".to_string()
            )))
        );
        assert!(parse_line("select").is_err());
    }

    #[test]
    fn test_port_without_value_means_default() {
        assert_eq!(
            parse_line("port").unwrap(),
            Some(Input::Command(Command::SetPort(String::new())))
        );
        assert_eq!(
            parse_line("port 9000").unwrap(),
            Some(Input::Command(Command::SetPort("9000".to_string())))
        );
    }

    #[test]
    fn test_unknown_command() {
        let err = parse_line("scan now").unwrap_err();
        assert!(err.contains("scan"));
    }
}
