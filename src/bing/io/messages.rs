use std::env;

/// Languages the UI can be shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Language {
    #[default]
    EnUs,
    PtBr,
}

impl Language {
    /// Picks the language from the system locale, falling back to English.
    pub(crate) fn system() -> Self {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|key| env::var(key).ok())
            .find(|value| !value.is_empty())
            .map(|locale| Self::from_locale(&locale))
            .unwrap_or_default()
    }

    /// Parses locales such as `pt_BR.UTF-8` or `en-US`.
    pub(crate) fn from_locale(locale: &str) -> Self {
        let tag = locale.split(['.', '@']).next().unwrap_or_default().replace('-', "_");
        match tag.as_str() {
            "pt_BR" => Language::PtBr,
            _ => Language::EnUs,
        }
    }

    pub(crate) fn window_title(&self) -> &'static str {
        "Bing Image Downloader"
    }

    pub(crate) fn config_group(&self) -> &'static str {
        match self {
            Language::EnUs => "Configuration",
            Language::PtBr => "Configuração",
        }
    }

    pub(crate) fn image_source(&self) -> &'static str {
        match self {
            Language::EnUs => "Image Source",
            Language::PtBr => "Fonte da Imagem",
        }
    }

    pub(crate) fn cookie_label(&self) -> &'static str {
        "Cookie (_U)"
    }

    pub(crate) fn cookie_help(&self) -> &'static str {
        match self {
            Language::EnUs => "To get your _U cookie:\n1. Open Bing Image Creator in your browser\n2. Press F12 to open Developer Tools\n3. Go to Application/Storage tab\n4. Find and copy the _U cookie value",
            Language::PtBr => "Para obter seu cookie _U:\n1. Abra o Bing Image Creator no seu navegador\n2. Pressione F12 para abrir as Ferramentas do Desenvolvedor\n3. Vá para a aba Application/Storage\n4. Encontre e copie o valor do cookie _U",
        }
    }

    pub(crate) fn collections_label(&self) -> &'static str {
        match self {
            Language::EnUs => "Collections (comma-separated)",
            Language::PtBr => "Coleções (separadas por vírgula)",
        }
    }

    pub(crate) fn destination_folder(&self) -> &'static str {
        match self {
            Language::EnUs => "Destination Folder",
            Language::PtBr => "Pasta de Destino",
        }
    }

    pub(crate) fn filename_pattern(&self) -> &'static str {
        match self {
            Language::EnUs => "Filename Pattern",
            Language::PtBr => "Padrão do Nome do Arquivo",
        }
    }

    pub(crate) fn use_local_time(&self) -> &'static str {
        match self {
            Language::EnUs => "Use Local Time Zone",
            Language::PtBr => "Usar Fuso Horário Local",
        }
    }

    pub(crate) fn delete_collection(&self) -> &'static str {
        match self {
            Language::EnUs => "Delete Collection After Download",
            Language::PtBr => "Excluir Coleção Após Download",
        }
    }

    pub(crate) fn detailed_stats(&self) -> &'static str {
        match self {
            Language::EnUs => "Generate Detailed Statistics",
            Language::PtBr => "Gerar Estatísticas Detalhadas",
        }
    }

    pub(crate) fn start_download(&self) -> &'static str {
        match self {
            Language::EnUs => "Start Download",
            Language::PtBr => "Iniciar Download",
        }
    }

    pub(crate) fn error_no_cookie(&self) -> &'static str {
        match self {
            Language::EnUs => "Please enter your cookie for API method",
            Language::PtBr => "Por favor, insira seu cookie para o método API",
        }
    }

    pub(crate) fn error_no_collections(&self) -> &'static str {
        match self {
            Language::EnUs => "Please enter at least one collection name",
            Language::PtBr => "Por favor, insira pelo menos um nome de coleção",
        }
    }

    pub(crate) fn error_no_folder(&self) -> &'static str {
        match self {
            Language::EnUs => "Please select a destination folder",
            Language::PtBr => "Por favor, selecione uma pasta de destino",
        }
    }

    pub(crate) fn error_create_folder(&self, reason: &str) -> String {
        match self {
            Language::EnUs => format!("Could not create destination folder: {}", reason),
            Language::PtBr => format!("Não foi possível criar a pasta de destino: {}", reason),
        }
    }

    pub(crate) fn starting_download(&self) -> &'static str {
        match self {
            Language::EnUs => "Starting download...",
            Language::PtBr => "Iniciando download...",
        }
    }

    pub(crate) fn download_completed(&self) -> &'static str {
        match self {
            Language::EnUs => "Download completed!",
            Language::PtBr => "Download concluído!",
        }
    }

    pub(crate) fn successful_downloads(&self, successful: usize, total: usize) -> String {
        match self {
            Language::EnUs => format!("Successfully downloaded {} of {} images", successful, total),
            Language::PtBr => format!("Download bem-sucedido de {} de {} imagens", successful, total),
        }
    }

    pub(crate) fn time_elapsed(&self, seconds: f64) -> String {
        match self {
            Language::EnUs => format!("Time elapsed: {:.2} seconds", seconds),
            Language::PtBr => format!("Tempo decorrido: {:.2} segundos", seconds),
        }
    }

    pub(crate) fn download_cancelled(&self) -> &'static str {
        match self {
            Language::EnUs => "Download cancelled",
            Language::PtBr => "Download cancelado",
        }
    }

    pub(crate) fn system_limits(&self) -> &'static str {
        match self {
            Language::EnUs => "System Limits (macOS)",
            Language::PtBr => "Limites do Sistema (macOS)",
        }
    }

    pub(crate) fn max_connections(&self) -> &'static str {
        match self {
            Language::EnUs => "Max Connections",
            Language::PtBr => "Conexões Máximas",
        }
    }

    pub(crate) fn memory_limit(&self) -> &'static str {
        match self {
            Language::EnUs => "Memory Limit (MB)",
            Language::PtBr => "Limite de Memória (MB)",
        }
    }

    pub(crate) fn cancel_hint(&self) -> &'static str {
        match self {
            Language::EnUs => "Press Ctrl-C to cancel",
            Language::PtBr => "Pressione Ctrl-C para cancelar",
        }
    }

    pub(crate) fn download_again(&self) -> &'static str {
        match self {
            Language::EnUs => "Start another download?",
            Language::PtBr => "Iniciar outro download?",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_locale() {
        assert_eq!(Language::from_locale("pt_BR.UTF-8"), Language::PtBr);
        assert_eq!(Language::from_locale("pt-BR"), Language::PtBr);
        assert_eq!(Language::from_locale("en_US.UTF-8"), Language::EnUs);
        assert_eq!(Language::from_locale("de_DE"), Language::EnUs);
        assert_eq!(Language::from_locale("C"), Language::EnUs);
        assert_eq!(Language::from_locale(""), Language::EnUs);
    }

    #[test]
    fn test_summary_formatting() {
        let en = Language::EnUs;
        assert_eq!(en.successful_downloads(8, 10), "Successfully downloaded 8 of 10 images");
        assert_eq!(en.time_elapsed(3.21), "Time elapsed: 3.21 seconds");
        assert_eq!(en.time_elapsed(2.0), "Time elapsed: 2.00 seconds");

        let pt = Language::PtBr;
        assert!(pt.successful_downloads(8, 10).contains("8 de 10"));
        assert!(pt.time_elapsed(3.214).contains("3.21"));
    }
}
