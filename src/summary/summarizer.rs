use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Only the top of the slide is searched for a heading.
const TITLE_SCAN_LINES: usize = 6;
const MAX_BULLETS: usize = 5;
const MAX_FALLBACK_BULLETS: usize = 3;
pub const KEYWORD_LIMIT: usize = 6;
const MIN_KEYWORD_CHARS: usize = 4;
/// Headings with this share of all-caps words are banners or logos.
const MAX_SHOUTING_RATIO: f64 = 0.7;
const MAX_SPECIAL_CHAR_RATIO: f64 = 0.5;

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));
static DIGITS_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("valid digits pattern"));
/// Bullet glyph, `12.`/`3)` enumerator or `a.`/`b)` enumerator, plus the
/// whitespace that follows it.
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[•\-*◦▪]|\d+[.)]|[a-z][.)])\s+").expect("valid list marker pattern")
});

const STOP_WORDS: &[&str] = &[
    "de", "la", "el", "y", "en", "a", "que", "los", "las", "un", "una", "por", "para", "con",
    "del", "al", "se", "es", "su", "uno", "como", "más", "mas", "pero", "este", "esta", "estos",
    "estas", "ese", "esa", "esos", "esas", "sobre", "entre", "cuando", "donde", "desde", "hasta",
    "también", "tambien", "porque", "todo", "todos", "toda", "todas", "sus", "les", "nos",
    "son", "fue", "ser", "está", "están", "tiene", "tienen", "puede", "pueden", "cada",
    "otro", "otra", "otros", "otras", "según", "durante", "ante", "bajo", "tras", "sin", "muy",
    "hay", "sino", "cual", "cuál", "algo", "nada", "ellos", "ellas", "nosotros", "usted",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub title: String,
    pub bullets: Vec<String>,
    pub keywords: Vec<String>,
    pub raw_text: String,
}

/// Extracts a title, bullet points and keywords from recognized slide text.
///
/// The result depends only on `text`: the same input always produces the
/// same summary, including keyword order.
pub fn summarize(text: &str) -> Summary {
    let lines = retained_lines(text);
    let title = extract_title(&lines);
    let bullets = extract_bullets(&lines, &title);
    let keywords = top_keywords(&lines, KEYWORD_LIMIT);

    Summary {
        title,
        bullets,
        keywords,
        raw_text: text.to_string(),
    }
}

/// Normalized, non-noise lines in reading order.
fn retained_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(|line| WHITESPACE_RUN.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty() && !is_noise_line(line))
        .collect()
}

/// Page numbers, stray OCR fragments and symbol soup.
pub fn is_noise_line(line: &str) -> bool {
    let len = char_len(line);
    if len < 3 {
        return true;
    }
    if DIGITS_ONLY.is_match(line) {
        return true;
    }
    let special = line
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    special as f64 / len as f64 > MAX_SPECIAL_CHAR_RATIO
}

fn extract_title(lines: &[String]) -> String {
    lines
        .iter()
        .take(TITLE_SCAN_LINES)
        .find(|line| looks_like_title(line))
        .or_else(|| lines.iter().find(|line| (10..=80).contains(&char_len(line))))
        .cloned()
        .unwrap_or_default()
}

fn looks_like_title(line: &str) -> bool {
    if !(10..=100).contains(&char_len(line)) || line.ends_with('.') || line.ends_with(',') {
        return false;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    if !(2..=10).contains(&words.len()) {
        return false;
    }

    let shouting = words.iter().filter(|word| is_shouting(word)).count();
    (shouting as f64 / words.len() as f64) < MAX_SHOUTING_RATIO
}

fn is_shouting(word: &str) -> bool {
    char_len(word) > 1 && word.chars().any(char::is_alphabetic) && word.to_uppercase() == word
}

/// A retained line considered as a bullet: the text after any list marker,
/// and whether a marker was present.
fn bullet_candidate(line: &str) -> Option<(&str, bool)> {
    if !(15..=200).contains(&char_len(line)) {
        return None;
    }

    let (body, marked) = match LIST_MARKER.find(line) {
        Some(marker) => (&line[marker.end()..], true),
        None => (line, false),
    };

    // A marker already says "this is a point", so short items are kept.
    let min_words = if marked { 2 } else { 3 };
    let words = body.split_whitespace().count();
    (min_words..=20).contains(&words).then_some((body, marked))
}

fn extract_bullets(lines: &[String], title: &str) -> Vec<String> {
    let marked: Vec<String> = lines
        .iter()
        .filter_map(|line| bullet_candidate(line))
        .filter(|(_, marked)| *marked)
        .take(MAX_BULLETS)
        .map(|(body, _)| body.to_string())
        .collect();
    if !marked.is_empty() {
        return marked;
    }

    let sentences: Vec<String> = lines
        .iter()
        .filter(|line| line.as_str() != title)
        .filter_map(|line| bullet_candidate(line))
        .take(MAX_BULLETS)
        .map(|(body, _)| body.to_string())
        .collect();
    if !sentences.is_empty() {
        return sentences;
    }

    lines
        .iter()
        .filter(|line| (20..=120).contains(&char_len(line)))
        .take(MAX_FALLBACK_BULLETS)
        .cloned()
        .collect()
}

/// Most frequent content words, ties broken by first appearance.
fn top_keywords(lines: &[String], limit: usize) -> Vec<String> {
    // word -> (count, first position)
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    for raw in lines.iter().flat_map(|line| line.split_whitespace()) {
        let word = raw
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if char_len(&word) < MIN_KEYWORD_CHARS
            || !word.chars().any(char::is_alphabetic)
            || STOP_WORDS.contains(&word.as_str())
        {
            continue;
        }
        let position = counts.len();
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(limit)
        .map(|(word, _, _)| word)
        .collect()
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEETING_SLIDE: &str = "REUNIÓN DE EQUIPO\n\nObjetivos del proyecto para el trimestre\n\
        1. Revisar presupuesto\n2. Planificar sprint\n\n42";

    #[test]
    fn empty_text_gives_empty_summary() {
        let summary = summarize("");
        assert_eq!(summary.title, "");
        assert!(summary.bullets.is_empty());
        assert!(summary.keywords.is_empty());
        assert_eq!(summary.raw_text, "");
    }

    #[test]
    fn meeting_slide() {
        let summary = summarize(MEETING_SLIDE);

        assert_eq!(summary.title, "Objetivos del proyecto para el trimestre");
        assert_eq!(summary.bullets, vec!["Revisar presupuesto", "Planificar sprint"]);
        assert_eq!(
            summary.keywords,
            vec!["reunión", "equipo", "objetivos", "proyecto", "trimestre", "revisar"]
        );
        for keyword in &summary.keywords {
            assert!(keyword.chars().count() >= 4);
            assert!(!STOP_WORDS.contains(&keyword.as_str()));
        }
        assert!(!summary.keywords.iter().any(|k| k == "42"));
        assert_eq!(summary.raw_text, MEETING_SLIDE);
    }

    #[test]
    fn page_numbers_and_symbols_are_noise() {
        assert!(is_noise_line("42"));
        assert!(is_noise_line("ab"));
        assert!(is_noise_line("2024"));
        assert!(is_noise_line("--- ** ---"));
        assert!(!is_noise_line("Costos 2024"));
    }

    #[test]
    fn summarize_is_deterministic() {
        let text = "Arquitectura del sistema distribuido\n- nodos replican datos entre regiones\n\
            - consenso basado en quorum mayoritario\nnodos datos regiones quorum nodos datos";
        let first = summarize(text);
        for _ in 0..10 {
            assert_eq!(summarize(text), first);
        }
    }

    #[test]
    fn shouting_banner_is_not_a_title() {
        let summary = summarize("UNIVERSIDAD NACIONAL AUTÓNOMA\nIntroducción a redes neuronales\n");
        assert_eq!(summary.title, "Introducción a redes neuronales");
    }

    #[test]
    fn title_falls_back_to_first_medium_line() {
        // Single-word line cannot be a heading, but is long enough for the fallback.
        let summary = summarize("Fotosíntesis\nla energía luminosa se transforma.");
        assert_eq!(summary.title, "Fotosíntesis");
    }

    #[test]
    fn title_is_searched_in_first_six_lines_only() {
        let text = "Primera frase que termina en punto.\n\
                    Segunda frase que termina en punto.\n\
                    Tercera frase que termina en punto.\n\
                    Cuarta frase que termina en punto.\n\
                    Quinta frase que termina en punto.\n\
                    Sexta frase que termina en punto.\n\
                    Resultados del experimento final";
        let summary = summarize(text);
        assert_eq!(summary.title, "Primera frase que termina en punto.");
    }

    #[test]
    fn bullet_glyphs_are_stripped() {
        let text = "Ventajas del enfoque\n• reduce la latencia de red\n\
            - simplifica el despliegue continuo\n* mejora la observabilidad general\n\
            ◦ menor costo de operación\n▪ escala horizontalmente sin cambios";
        let summary = summarize(text);
        assert_eq!(
            summary.bullets,
            vec![
                "reduce la latencia de red",
                "simplifica el despliegue continuo",
                "mejora la observabilidad general",
                "menor costo de operación",
                "escala horizontalmente sin cambios",
            ]
        );
    }

    #[test]
    fn letter_enumerators_are_stripped() {
        let summary = summarize("Pasos\na) Preparar el entorno local\nb. Ejecutar las pruebas");
        assert_eq!(
            summary.bullets,
            vec!["Preparar el entorno local", "Ejecutar las pruebas"]
        );
    }

    #[test]
    fn at_most_five_bullets() {
        let text = (1..=8)
            .map(|i| format!("{i}. punto numero {i} de la lista"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(summarize(&text).bullets.len(), 5);
    }

    #[test]
    fn plain_sentences_become_bullets_when_unmarked() {
        let text = "Conclusiones del estudio\nLos resultados confirman la hipótesis inicial\n\
            Se requiere más investigación futura";
        let summary = summarize(text);
        assert_eq!(summary.title, "Conclusiones del estudio");
        assert_eq!(
            summary.bullets,
            vec![
                "Los resultados confirman la hipótesis inicial",
                "Se requiere más investigación futura",
            ]
        );
    }

    #[test]
    fn wordy_lines_fall_back_to_bullets() {
        // 25 words: too many for a bullet, short enough for the fallback.
        let wordy = "a b c d e f g h i j k l m n o p q r s t u v w x y";
        let summary = summarize(&format!("Resumen general del curso\n{wordy}"));
        assert_eq!(summary.title, "Resumen general del curso");
        assert_eq!(summary.bullets, vec!["Resumen general del curso", wordy]);
    }

    #[test]
    fn keywords_rank_by_frequency_then_first_seen() {
        let text = "datos modelo datos entrenamiento modelo datos validación";
        let summary = summarize(text);
        assert_eq!(
            summary.keywords,
            vec!["datos", "modelo", "entrenamiento", "validación"]
        );
    }

    #[test]
    fn keywords_ignore_punctuation_and_case() {
        let summary = summarize("Rust, rust y RUST: memoria segura (memoria)");
        assert_eq!(summary.keywords, vec!["rust", "memoria", "segura"]);
    }

    #[test]
    fn keyword_limit_is_six() {
        let text = "alfa beta gamma delta épsilon zeta theta iota kappa";
        assert_eq!(summarize(text).keywords.len(), KEYWORD_LIMIT);
    }

    #[test]
    fn carriage_returns_and_spacing_are_normalized() {
        let summary =
            summarize("Plan   de\tmigración   anual\r\n\r\n- mover   servicios a la nube\r");
        assert_eq!(summary.title, "Plan de migración anual");
        assert_eq!(summary.bullets, vec!["mover servicios a la nube"]);
    }
}
