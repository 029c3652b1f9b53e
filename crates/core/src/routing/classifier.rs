//! Deterministic keyword classification of a question into category and priority.
//!
//! Pure functions: no state, no I/O. Keywords are matched as substrings of
//! the lower-cased text, each keyword counting at most once.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Category, Contact, Priority};

fn keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Reseau => &[
            "vpn", "wifi", "wi-fi", "connexion", "internet", "réseau", "proxy", "ethernet",
            "routeur", "switch", "lan", "wan", "ip", "dns", "ping", "accès réseau",
            "partage réseau", "serveur", "pare-feu", "firewall", "connexion internet",
        ],
        Category::Materiel => &[
            "imprimante", "écran", "clavier", "souris", "ordinateur", "vidéoprojecteur", "pc",
            "laptop", "portable", "moniteur", "scanner", "webcam", "casque", "micro",
            "enceinte", "usb", "hdmi", "câble", "batterie", "chargeur", "disque dur", "ssd",
            "ram", "mémoire",
        ],
        Category::Logiciel => &[
            "word", "excel", "powerpoint", "office", "teams", "zoom", "logiciel", "application",
            "programme", "installer", "installation", "mise à jour", "update", "licence",
            "activation", "adobe", "chrome", "firefox", "edge",
        ],
        Category::Compte => &[
            "mot de passe", "password", "login", "connexion", "compte", "authentification",
            "identifiant", "accès", "session", "oublié", "bloqué", "verrouillé", "reset",
            "réinitialiser", "active directory", "ad", "utilisateur",
        ],
        Category::Messagerie => &[
            "email", "e-mail", "mail", "outlook", "messagerie", "courrier", "boîte", "inbox",
            "spam", "envoyer", "recevoir", "pièce jointe", "calendrier", "rendez-vous",
            "meeting",
        ],
        Category::Systeme => &[
            "windows", "mac", "linux", "système", "démarrage", "boot", "écran bleu", "bsod",
            "crash", "plantage", "lent", "ralenti", "virus", "antivirus", "malware",
            "mise à jour système", "redémarrage", "erreur système",
        ],
        Category::Acces => &[
            "droits", "permissions", "accès refusé", "access denied", "dossier partagé",
            "partage", "lecteur", "drive", "onedrive", "sharepoint", "lecture seule",
            "écriture", "autorisation",
        ],
        Category::Telephonie => &[
            "téléphone", "mobile", "smartphone", "appel", "voip", "standard", "numéro", "ligne",
            "sonnerie", "transfert", "messagerie vocale", "répondeur",
        ],
        Category::BaseDeDonnees => &[
            "base de données", "database", "sql", "mysql", "postgresql", "oracle", "requête",
            "table", "données", "backup", "sauvegarde", "restauration",
        ],
        Category::Autre => &[],
    }
}

const URGENT: &[&str] = &[
    "urgent", "critique", "bloquant", "panne", "serveur down", "tout le monde", "production",
    "client", "immédiat",
];

const HIGH: &[&str] = &[
    "important", "rapidement", "asap", "prioritaire", "ne fonctionne plus",
    "complètement cassé", "impossible de travailler",
];

const LOW: &[&str] = &[
    "quand vous pouvez", "pas urgent", "de temps en temps", "occasionnel", "mineur",
    "suggestion",
];

/// Number of the category's keywords present in already lower-cased text.
fn category_score(category: Category, lower: &str) -> usize {
    keywords(category).iter().filter(|k| lower.contains(*k)).count()
}

pub fn category_of(text: &str) -> Category {
    let lower = text.to_lowercase();
    let mut best = (Category::Autre, 0);
    for category in Category::SCORED {
        let score = category_score(category, &lower);
        // Strict `>` keeps the first-declared category on ties.
        if score > best.1 {
            best = (category, score);
        }
    }
    best.0
}

pub fn priority_of(text: &str) -> Priority {
    let lower = text.to_lowercase();
    let any = |set: &[&str]| set.iter().any(|k| lower.contains(k));
    if any(URGENT) {
        Priority::Urgente
    } else if any(HIGH) {
        Priority::Haute
    } else if any(LOW) {
        Priority::Basse
    } else {
        Priority::Moyenne
    }
}

pub fn classify(text: &str) -> (Category, Priority) {
    (category_of(text), priority_of(text))
}

/// Queue responsible for a category.
pub fn technician_for(category: Category) -> Contact {
    let (queue, email) = match category {
        Category::Reseau => ("Équipe réseau", "tech.reseau@helpdesk.example"),
        Category::Materiel => ("Équipe matériel", "tech.materiel@helpdesk.example"),
        Category::Logiciel => ("Équipe logiciel", "tech.logiciel@helpdesk.example"),
        Category::Compte => ("Équipe comptes", "tech.comptes@helpdesk.example"),
        Category::Messagerie => ("Équipe messagerie", "tech.messagerie@helpdesk.example"),
        Category::Systeme => ("Équipe système", "tech.systeme@helpdesk.example"),
        Category::Acces => ("Équipe accès", "tech.acces@helpdesk.example"),
        Category::Telephonie => ("Équipe téléphonie", "tech.telephonie@helpdesk.example"),
        Category::BaseDeDonnees => ("Équipe bases de données", "tech.database@helpdesk.example"),
        Category::Autre => ("Helpdesk", "helpdesk@helpdesk.example"),
    };
    Contact { queue: queue.to_owned(), email: email.to_owned() }
}

static CATEGORY_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\[\s*cat[ée]gorie\s*:\s*([^\]]+)\]").ok());

/// Find a `[Catégorie: X]` tag in generated prose.
///
/// Returns the text with every tag removed and the category named by the
/// first tag, if it names a known one.
pub fn parse_category_tag(text: &str) -> (String, Option<Category>) {
    let Some(re) = CATEGORY_TAG.as_ref() else {
        return (text.to_owned(), None);
    };
    let category = re
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| Category::from_label(m.as_str()));
    let stripped = re.replace_all(text, "");
    (stripped.trim().to_owned(), category)
}
