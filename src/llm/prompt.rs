//! System prompt assembly.
//!
//! The prompt sent with every request has three parts:
//! * the configured persona and reply-format instructions,
//! * a catalogue of the available actions, generated from [`ActionKind`],
//! * the current date, time and weekday.

use chrono::{DateTime, Datelike, Local, Weekday};

use crate::actions::ActionKind;

// ---------------------------------------------------------------------------
// Base instructions
// ---------------------------------------------------------------------------

/// Persona and tag format.  Users may replace it via `llm.system_prompt`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
# IDENTIDADE

Você é J.A.R.V.I.S. (Just A Rather Very Intelligent System), o assistente pessoal do {user}. \
Você é educado, formal e sofisticado, com humor sutil, e chama o usuário de \"senhor\".

## COMO VOCÊ FALA

- Use português brasileiro com a elegância britânica do JARVIS original.
- Seja conciso para comandos e conversacional para interações.
- Suas respostas serão faladas em voz alta: nada de listas, markdown ou emojis.

## FORMATO DE RESPOSTA PARA COMANDOS

Quando precisar executar uma ação no PC, inclua no início da resposta:
[AÇÃO: TIPO]
[PARAM: parâmetro]

Depois das tags, escreva a frase que será falada.

## EXEMPLOS

Usuário: \"Abre o Chrome\"
[AÇÃO: ABRIR_PROGRAMA]
[PARAM: chrome]
Abrindo o Chrome, senhor.

Usuário: \"Aumenta o volume\"
[AÇÃO: VOLUME]
[PARAM: aumentar 10]
Volume ajustado, senhor.

Usuário: \"Quando Roma foi criada?\"
[AÇÃO: NENHUMA]
Roma foi fundada em 753 a.C., senhor, pelo menos segundo a lenda de Rômulo e Remo.

Usuário: \"Desliga o PC\"
[AÇÃO: NENHUMA]
Senhor, confirma o desligamento do sistema?";

// ---------------------------------------------------------------------------
// SystemPrompt
// ---------------------------------------------------------------------------

/// Renders the system message for one request.
///
/// ```rust
/// use jarvis_voice::llm::SystemPrompt;
///
/// let prompt = SystemPrompt::new("Você é um assistente.", "Lucas");
/// let text = prompt.render();
/// assert!(text.contains("ABRIR_PROGRAMA"));
/// assert!(text.contains("Informações atuais"));
/// ```
#[derive(Debug, Clone)]
pub struct SystemPrompt {
    base: String,
}

impl SystemPrompt {
    /// `{user}` in `base` is replaced with `user_name`.
    pub fn new(base: &str, user_name: &str) -> Self {
        Self {
            base: base.replace("{user}", user_name),
        }
    }

    /// Render with the local clock.
    pub fn render(&self) -> String {
        self.render_at(Local::now())
    }

    /// Render with an explicit timestamp.
    pub fn render_at(&self, now: DateTime<Local>) -> String {
        format!(
            "{}\n\n{}\n{}",
            self.base.trim_end(),
            action_catalogue(),
            date_context(now)
        )
    }
}

/// Bullet list of every action identifier with its description.
pub fn action_catalogue() -> String {
    let mut out = String::from("Tipos de ação disponíveis:\n");
    for kind in ActionKind::ALL {
        out.push_str(&format!("- {}: {}\n", kind.identifier(), kind.description()));
    }
    out
}

fn date_context(now: DateTime<Local>) -> String {
    format!(
        "Informações atuais:\n- Data: {}\n- Hora: {}\n- Dia da semana: {}\n",
        now.format("%d/%m/%Y"),
        now.format("%H:%M"),
        weekday_pt(now.weekday())
    )
}

fn weekday_pt(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
