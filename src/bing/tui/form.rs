use console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

use crate::bing::io::messages::Language;
use crate::bing::io::{Preferences, SourceMethod};
use crate::bing::limits::SystemLimits;

/// The configuration form shown before every download.
pub(crate) struct ConfigForm {
    theme: ColorfulTheme,
    language: Language,
}

impl ConfigForm {
    pub(crate) fn new(language: Language) -> Self {
        ConfigForm {
            theme: ColorfulTheme::default(),
            language,
        }
    }

    /// Asks for every setting, starting from `current`.
    pub(crate) fn edit(&self, current: &Preferences) -> dialoguer::Result<Preferences> {
        let lang = self.language;
        println!("{}", style(lang.config_group()).bold().underlined());

        let sources = SourceMethod::variants();
        let selected = Select::with_theme(&self.theme)
            .with_prompt(lang.image_source())
            .items(sources)
            .default(sources.iter().position(|s| *s == current.source).unwrap_or(0))
            .interact()?;
        let source = sources[selected];

        let cookie = if source == SourceMethod::Api {
            println!("{}", style(lang.cookie_help()).dim());
            self.text(lang.cookie_label(), &current.cookie)?
        } else {
            current.cookie.clone()
        };

        let collections = self.text(lang.collections_label(), &current.collections)?;
        let destination_folder = self.text(lang.destination_folder(), &current.destination_folder)?;
        let pattern: String = Input::with_theme(&self.theme)
            .with_prompt(lang.filename_pattern())
            .with_initial_text(&current.pattern)
            .interact_text()?;

        let (connection_limit, memory_limit) = if SystemLimits::platform_supported() {
            println!("{}", style(lang.system_limits()).bold());
            let connections = self.limit(
                lang.max_connections(),
                current.connection_limit.unwrap_or(SystemLimits::DEFAULT_CONNECTIONS),
                *SystemLimits::CONNECTION_RANGE.start(),
                *SystemLimits::CONNECTION_RANGE.end(),
            )?;
            let memory = self.limit(
                lang.memory_limit(),
                current.memory_limit.unwrap_or(SystemLimits::DEFAULT_MEMORY_MB),
                *SystemLimits::MEMORY_RANGE.start(),
                *SystemLimits::MEMORY_RANGE.end(),
            )?;
            (Some(connections), Some(memory))
        } else {
            (current.connection_limit, current.memory_limit)
        };

        let use_local_time = self.confirm(lang.use_local_time(), current.use_local_time)?;
        let delete_collection = self.confirm(lang.delete_collection(), current.delete_collection)?;
        let detailed_stats = self.confirm(lang.detailed_stats(), current.detailed_stats)?;

        Ok(Preferences {
            source,
            cookie,
            collections,
            destination_folder,
            pattern,
            use_local_time,
            delete_collection,
            detailed_stats,
            connection_limit,
            memory_limit,
        })
    }

    /// A yes/no question.
    pub(crate) fn confirm(&self, prompt: &str, default: bool) -> dialoguer::Result<bool> {
        Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .show_default(true)
            .interact()
    }

    fn text(&self, prompt: &str, initial: &str) -> dialoguer::Result<String> {
        Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .with_initial_text(initial)
            .allow_empty(true)
            .interact_text()
    }

    fn limit(&self, prompt: &str, default: u32, min: u32, max: u32) -> dialoguer::Result<u32> {
        Input::with_theme(&self.theme)
            .with_prompt(format!("{} ({}-{}, step {})", prompt, min, max, SystemLimits::STEP))
            .default(default)
            .validate_with(move |value: &u32| -> Result<(), String> {
                if (min..=max).contains(value) {
                    Ok(())
                } else {
                    Err(format!("Enter a value between {} and {}", min, max))
                }
            })
            .interact_text()
    }
}
