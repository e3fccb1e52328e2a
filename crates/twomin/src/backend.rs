//! Desktop notification backends for different platforms

use std::process::Command;

use crate::error::NotifyError;

/// A notification to display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    /// Notification title
    pub title: String,
    /// Notification message/body
    pub message: String,
    /// Whether to play a sound
    pub sound: bool,
}

impl Notification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            sound: true,
        }
    }

    /// Disable sound
    pub fn silent(mut self) -> Self {
        self.sound = false;
        self
    }
}

/// Available notification backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// macOS terminal-notifier
    TerminalNotifier,
    /// macOS osascript
    Osascript,
    /// Linux notify-send
    NotifySend,
    /// KDE kdialog
    Kdialog,
    /// WSL PowerShell
    Wsl,
    /// Fallback: print to stdout
    Echo,
}

impl Backend {
    /// Detect the best available backend for the current platform
    pub fn detect() -> Self {
        #[cfg(target_os = "macos")]
        {
            if Self::command_exists("terminal-notifier") {
                return Self::TerminalNotifier;
            }
            return Self::Osascript;
        }

        #[cfg(target_os = "linux")]
        {
            if std::env::var("WSL_DISTRO_NAME").is_ok() {
                return Self::Wsl;
            }
            if Self::command_exists("notify-send") {
                return Self::NotifySend;
            }
            if Self::command_exists("kdialog") {
                return Self::Kdialog;
            }
            return Self::Echo;
        }

        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        {
            Self::Echo
        }
    }

    fn command_exists(cmd: &str) -> bool {
        Command::new("which")
            .arg(cmd)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TerminalNotifier => "terminal-notifier",
            Self::Osascript => "osascript",
            Self::NotifySend => "notify-send",
            Self::Kdialog => "kdialog",
            Self::Wsl => "wsl",
            Self::Echo => "echo",
        }
    }

    /// Send a notification using this backend
    pub fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::TerminalNotifier => self.send_terminal_notifier(notification),
            Self::Osascript => self.send_osascript(notification),
            Self::NotifySend => self.send_notify_send(notification),
            Self::Kdialog => self.send_kdialog(notification),
            Self::Wsl => self.send_wsl(notification),
            Self::Echo => self.send_echo(notification),
        }
    }

    fn run(&self, cmd: &mut Command) -> Result<(), NotifyError> {
        let status = cmd.status()?;
        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::Backend {
                backend: self.name(),
                reason: format!("exited with {}", status),
            })
        }
    }

    fn send_terminal_notifier(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut cmd = Command::new("terminal-notifier");
        cmd.args([
            "-title",
            &notification.title,
            "-message",
            &notification.message,
            "-group",
            "twomin",
        ]);
        if notification.sound {
            cmd.args(["-sound", "default"]);
        }
        self.run(&mut cmd)
    }

    fn send_osascript(&self, notification: &Notification) -> Result<(), NotifyError> {
        let title = notification.title.replace('"', r#"\""#);
        let message = notification.message.replace('"', r#"\""#);

        let mut script = format!(r#"display notification "{}" with title "{}""#, message, title);
        if notification.sound {
            script.push_str(r#" sound name "default""#);
        }

        self.run(Command::new("osascript").args(["-e", &script]))
    }

    fn send_notify_send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut cmd = Command::new("notify-send");
        cmd.args(["--app-name", "twomin", &notification.title, &notification.message]);
        self.run(&mut cmd)
    }

    fn send_kdialog(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.run(Command::new("kdialog").args([
            "--passivepopup",
            &notification.message,
            "5",
            "--title",
            &notification.title,
        ]))
    }

    fn send_wsl(&self, notification: &Notification) -> Result<(), NotifyError> {
        let title = notification.title.replace('\'', "''");
        let message = notification.message.replace('\'', "''");

        let ps_script = format!(
            r#"[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null; $template = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02); $template.GetElementsByTagName('text')[0].AppendChild($template.CreateTextNode('{}')) | Out-Null; $template.GetElementsByTagName('text')[1].AppendChild($template.CreateTextNode('{}')) | Out-Null; [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('twomin').Show([Windows.UI.Notifications.ToastNotification]::new($template))"#,
            title, message
        );

        // PowerShell interop is flaky under WSL; echo instead of failing
        if self.run(Command::new("powershell.exe").args(["-Command", &ps_script])).is_err() {
            return self.send_echo(notification);
        }
        Ok(())
    }

    fn send_echo(&self, notification: &Notification) -> Result<(), NotifyError> {
        println!("[{}] {}", notification.title, notification.message.replace('\n', " "));
        Ok(())
    }
}
