//! Payload keywords and the canned replies they map to

use std::str::FromStr;

use mb_core::Translator;

use crate::error::{MessengerError, Result};
use crate::response::Response;

/// Known postback / quick reply payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Payload {
    /// Get Started button
    Empezar,
    MenuPrincipal,
    Soporte,
    Atencion,
    Informacion,
    LineaAtencion,
    /// Hand the conversation to a human
    Agente,
    FinalizarChat,
    NuevaConsulta,
}

impl Payload {
    /// Options offered by the help quick reply
    pub const MAIN_MENU: [Payload; 6] = [
        Payload::Soporte,
        Payload::Atencion,
        Payload::Informacion,
        Payload::LineaAtencion,
        Payload::Agente,
        Payload::FinalizarChat,
    ];

    /// Postback actions of the persistent menu
    pub const PERSISTENT_MENU: [Payload; 6] = [
        Payload::Soporte,
        Payload::Atencion,
        Payload::Informacion,
        Payload::LineaAtencion,
        Payload::MenuPrincipal,
        Payload::FinalizarChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Payload::Empezar => "EMPEZAR",
            Payload::MenuPrincipal => "MENU_PRINCIPAL",
            Payload::Soporte => "SOPORTE",
            Payload::Atencion => "ATENCION",
            Payload::Informacion => "INFORMACION",
            Payload::LineaAtencion => "LINEA_ATENCION",
            Payload::Agente => "AGENTE",
            Payload::FinalizarChat => "FINALIZAR_CHAT",
            Payload::NuevaConsulta => "NUEVA_CONSULTA",
        }
    }

    /// Localized button title
    pub fn title(&self, tr: Translator<'_>) -> String {
        let key = match self {
            Payload::Empezar | Payload::MenuPrincipal => "menu.menuPrincipal",
            Payload::Soporte => "menu.soporte",
            Payload::Atencion => "menu.atencion",
            Payload::Informacion => "menu.informacion",
            Payload::LineaAtencion => "menu.lineaAtencion",
            Payload::Agente => "menu.agente",
            Payload::FinalizarChat => "menu.finalizarChat",
            Payload::NuevaConsulta => "respuestas.nuevaConsulta",
        };
        tr.t(key)
    }
}

impl FromStr for Payload {
    type Err = MessengerError;

    /// Exact keyword match
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "EMPEZAR" => Ok(Payload::Empezar),
            "MENU_PRINCIPAL" => Ok(Payload::MenuPrincipal),
            "SOPORTE" => Ok(Payload::Soporte),
            "ATENCION" => Ok(Payload::Atencion),
            "INFORMACION" => Ok(Payload::Informacion),
            "LINEA_ATENCION" => Ok(Payload::LineaAtencion),
            "AGENTE" => Ok(Payload::Agente),
            "FINALIZAR_CHAT" => Ok(Payload::FinalizarChat),
            "NUEVA_CONSULTA" => Ok(Payload::NuevaConsulta),
            other => Err(MessengerError::UnknownPayload(other.to_string())),
        }
    }
}

/// Static payload → reply table
pub struct Bot;

impl Bot {
    /// Canned reply for `payload`, or `None` when the table has no entry.
    ///
    /// Every reply offers a single "new question" quick reply. The agent
    /// hand-off is spoken by `agent_persona` when one is registered.
    pub fn handle_payload(
        payload: Payload,
        tr: Translator<'_>,
        agent_persona: Option<&str>,
    ) -> Option<Response> {
        let key = match payload {
            Payload::Soporte => "respuestas.soporte",
            Payload::Atencion => "respuestas.atencion",
            Payload::Informacion => "respuestas.informacion",
            Payload::MenuPrincipal => "menu.menuPrincipal",
            Payload::LineaAtencion => "respuestas.lineaAtencion",
            Payload::FinalizarChat => "respuestas.finalizarChat",
            Payload::Agente => "respuestas.agente",
            Payload::Empezar | Payload::NuevaConsulta => return None,
        };

        let new_query = Payload::NuevaConsulta;
        let response = Response::quick_reply(tr.t(key), [(new_query.title(tr), new_query.as_str())]);

        match (payload, agent_persona) {
            (Payload::Agente, Some(persona_id)) => Some(response.with_persona(persona_id)),
            _ => Some(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_core::Catalog;

    #[test]
    fn test_keyword_round_trip() {
        for payload in Payload::MAIN_MENU.iter().chain(Payload::PERSISTENT_MENU.iter()) {
            assert_eq!(payload.as_str().parse::<Payload>().unwrap(), *payload);
        }
        assert_eq!("EMPEZAR".parse::<Payload>().unwrap(), Payload::Empezar);
        assert!(matches!(
            "soporte".parse::<Payload>(),
            Err(MessengerError::UnknownPayload(_))
        ));
        assert!("SOPORTE_TECNICO".parse::<Payload>().is_err());
    }

    #[test]
    fn test_table_replies() {
        let catalog = Catalog::bundled("es_ES").unwrap();
        let tr = catalog.translator("es_ES");

        let cases = [
            (Payload::Soporte, "respuestas.soporte"),
            (Payload::Atencion, "respuestas.atencion"),
            (Payload::Informacion, "respuestas.informacion"),
            (Payload::MenuPrincipal, "menu.menuPrincipal"),
            (Payload::LineaAtencion, "respuestas.lineaAtencion"),
            (Payload::FinalizarChat, "respuestas.finalizarChat"),
        ];

        for (payload, key) in cases {
            let response = Bot::handle_payload(payload, tr, None).unwrap();
            assert_eq!(response.message.text, Some(tr.t(key)));
            assert_eq!(response.message.quick_replies.len(), 1);
            assert_eq!(response.message.quick_replies[0].payload, "NUEVA_CONSULTA");
            assert!(response.persona_id.is_none());
        }
    }

    #[test]
    fn test_agent_persona() {
        let catalog = Catalog::bundled("es_ES").unwrap();
        let tr = catalog.translator("es_ES");

        let response = Bot::handle_payload(Payload::Agente, tr, Some("persona-1")).unwrap();
        assert_eq!(response.persona_id.as_deref(), Some("persona-1"));

        let response = Bot::handle_payload(Payload::Agente, tr, None).unwrap();
        assert!(response.persona_id.is_none());
    }

    #[test]
    fn test_not_in_table() {
        let catalog = Catalog::bundled("es_ES").unwrap();
        let tr = catalog.translator("es_ES");
        assert!(Bot::handle_payload(Payload::Empezar, tr, None).is_none());
        assert!(Bot::handle_payload(Payload::NuevaConsulta, tr, None).is_none());
    }
}
