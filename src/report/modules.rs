//! The fixed module order the Report Compiler walks, taken verbatim from
//! the source's comprehensive report generator: 16 analytic modules
//! followed by 5 appended "protocol" modules.

pub const MODULE_ORDER: &[&str] = &[
    "anti_objecao",
    "avatars",
    "concorrencia",
    "drivers_mentais",
    "funil_vendas",
    "insights_mercado",
    "palavras_chave",
    "plano_acao",
    "posicionamento",
    "pre_pitch",
    "predicoes_futuro",
    "provas_visuais",
    "metricas_conversao",
    "estrategia_preco",
    "canais_aquisicao",
    "cronograma_lancamento",
    "cpl_protocol_1",
    "cpl_protocol_2",
    "cpl_protocol_3",
    "cpl_protocol_4",
    "cpl_protocol_5",
];

/// Human-readable title for a module name, used in the table of contents.
pub fn title_for(module_name: &str) -> String {
    module_name
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_order_has_21_fixed_entries() {
        assert_eq!(MODULE_ORDER.len(), 21);
        assert_eq!(MODULE_ORDER[0], "anti_objecao");
        assert_eq!(MODULE_ORDER[16], "cpl_protocol_1");
        assert_eq!(MODULE_ORDER[20], "cpl_protocol_5");
    }

    #[test]
    fn title_for_humanizes_snake_case() {
        assert_eq!(title_for("drivers_mentais"), "Drivers Mentais");
        assert_eq!(title_for("cpl_protocol_1"), "Cpl Protocol 1");
    }
}
