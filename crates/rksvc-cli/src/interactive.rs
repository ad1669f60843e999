//! Interactive flow for the configure command.
//!
//! Prompts for every setting not already supplied through the environment,
//! showing the value currently in effect. Uses dialoguer for terminal UI prompts.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm as ConfirmPrompt, Input, theme::ColorfulTheme};

use rksvc_core::config::{ConfigDocument, ConfigOverrides, SettingKey, SettingValue};
use rksvc_core::confirm::Confirm;

/// Result of interactive flow.
#[derive(Debug, Clone)]
pub struct ConfigureResult {
    /// Values to apply, prompted and prefilled alike
    pub overrides: ConfigOverrides,
    /// Whether user confirmed the changes
    pub confirmed: bool,
}

/// Interactive flow for collecting settings.
pub struct ConfigureFlow<W: Write = io::Stdout> {
    /// Document currently on disk, if any
    current: Option<ConfigDocument>,
    /// Values from the environment; their prompts are skipped
    prefilled: ConfigOverrides,
    /// Skip the final confirmation
    yes: bool,
    /// Output writer (for testing)
    writer: W,
    /// Theme for dialoguer prompts
    theme: ColorfulTheme,
}

impl ConfigureFlow<io::Stdout> {
    pub fn new(current: Option<ConfigDocument>, prefilled: ConfigOverrides, yes: bool) -> Self {
        Self {
            current,
            prefilled,
            yes,
            writer: io::stdout(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> ConfigureFlow<W> {
    /// Create a new interactive flow with custom writer (for testing).
    #[cfg(test)]
    pub fn with_writer(
        current: Option<ConfigDocument>,
        prefilled: ConfigOverrides,
        yes: bool,
        writer: W,
    ) -> Self {
        Self {
            current,
            prefilled,
            yes,
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    /// Run the interactive flow.
    ///
    /// Flow:
    /// 1. One prompt per setting, defaulting to the current value
    /// 2. Show the settings that will change and confirm
    pub fn collect(&mut self) -> Result<ConfigureResult> {
        self.print_header()?;

        let mut overrides = ConfigOverrides::new();
        for key in SettingKey::ALL {
            let value = match self.prefilled.get(key) {
                Some(value) => value.clone(),
                None => self.prompt(key)?,
            };
            overrides.set(key, value);
        }

        let confirmed = self.show_summary_and_confirm(&overrides)?;
        Ok(ConfigureResult {
            overrides,
            confirmed,
        })
    }

    fn current_value(&self, key: SettingKey) -> SettingValue {
        self.current
            .as_ref()
            .map(|doc| doc.effective(key))
            .unwrap_or_else(|| key.default_value())
    }

    /// What a rewrite would be compared against: the value recorded in the
    /// document, or the default when no document exists yet.
    fn recorded_value(&self, key: SettingKey) -> Option<SettingValue> {
        match &self.current {
            Some(doc) => doc.get(key).cloned(),
            None => Some(key.default_value()),
        }
    }

    fn print_header(&mut self) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{}",
            style("  reasonkit-web Configuration").bold().cyan()
        )?;
        if self.current.is_none() {
            writeln!(self.writer, "  No configuration found; starting from defaults.")?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    fn prompt(&self, key: SettingKey) -> Result<SettingValue> {
        let current = self.current_value(key);
        let prompt = format!("{} ({})", key.name(), key.description());

        if let SettingValue::Flag(flag) = current {
            let answer = ConfirmPrompt::with_theme(&self.theme)
                .with_prompt(prompt)
                .default(flag)
                .interact()?;
            return Ok(SettingValue::Flag(answer));
        }

        let raw: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(current.to_string())
            .allow_empty(true)
            .validate_with(move |input: &String| -> Result<(), String> {
                key.parse(input).map(|_| ()).map_err(|err| err.to_string())
            })
            .interact_text()?;
        Ok(key.parse(&raw)?)
    }

    fn show_summary_and_confirm(&mut self, overrides: &ConfigOverrides) -> Result<bool> {
        writeln!(self.writer)?;
        writeln!(self.writer, "{}", style("  Summary").bold())?;
        writeln!(self.writer, "  ───────────────────────────")?;

        let mut changes = 0;
        for key in SettingKey::ALL {
            let Some(value) = overrides.get(key) else {
                continue;
            };
            match self.recorded_value(key) {
                Some(recorded) if recorded == *value => {
                    writeln!(self.writer, "  {:<12} {}", key.name(), value)?;
                }
                recorded => {
                    changes += 1;
                    let old = recorded.map_or_else(|| "(unset)".to_string(), |v| v.to_string());
                    writeln!(
                        self.writer,
                        "  {:<12} {} -> {}",
                        key.name(),
                        style(old).dim(),
                        style(value).green()
                    )?;
                }
            }
        }
        if changes == 0 {
            writeln!(self.writer, "  No changes.")?;
        }
        writeln!(self.writer)?;

        if self.yes || changes == 0 {
            return Ok(true);
        }

        let confirmed = ConfirmPrompt::with_theme(&self.theme)
            .with_prompt("Write these settings?")
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// Confirmation through a terminal prompt; `--yes` answers everything.
pub struct PromptConfirm {
    assume_yes: bool,
    theme: ColorfulTheme,
}

impl PromptConfirm {
    pub fn new(assume_yes: bool) -> Self {
        Self {
            assume_yes,
            theme: ColorfulTheme::default(),
        }
    }
}

impl Confirm for PromptConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        // No terminal to ask on counts as a refusal.
        ConfirmPrompt::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}
