//! Bootstrap knowledge: curated articles, FAQ items, historical tickets, and
//! a few manual question/answer pairs for the corpus.

use serde_json::json;

use super::lexical::{LexicalAdapter, LexicalDoc};
use crate::types::SourceKind;

pub struct HistoricalTicket {
    pub id: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub solution: &'static str,
    pub category: &'static str,
    pub status: &'static str,
    pub priority: &'static str,
}

pub struct KbArticle {
    pub id: u32,
    pub title: &'static str,
    pub content: &'static str,
    pub category: &'static str,
    pub views: u32,
}

pub struct FaqItem {
    pub id: u32,
    pub question: &'static str,
    pub answer: &'static str,
    pub category: &'static str,
    pub popularity: u32,
}

pub const TICKETS: &[HistoricalTicket] = &[
    HistoricalTicket {
        id: 1,
        title: "Problème de connexion VPN",
        description: "Impossible de se connecter au VPN de l'entreprise depuis ce matin. Message d'erreur: timeout.",
        solution: "Vérifier que le client VPN est à jour. Réinitialiser les paramètres réseau. Contacter le support si le problème persiste.",
        category: "Réseau",
        status: "Résolu",
        priority: "Haute",
    },
    HistoricalTicket {
        id: 2,
        title: "Imprimante ne répond pas",
        description: "L'imprimante du bureau 304 ne répond plus. Aucune impression n'est possible.",
        solution: "Redémarrer l'imprimante et vérifier la connexion réseau. Réinstaller les pilotes si nécessaire.",
        category: "Matériel",
        status: "Résolu",
        priority: "Moyenne",
    },
    HistoricalTicket {
        id: 3,
        title: "Mot de passe oublié",
        description: "Utilisateur a oublié son mot de passe Active Directory et ne peut plus se connecter.",
        solution: "Utiliser l'outil de réinitialisation en libre-service ou contacter le helpdesk pour un reset manuel.",
        category: "Compte",
        status: "Résolu",
        priority: "Haute",
    },
    HistoricalTicket {
        id: 4,
        title: "Écran bleu Windows",
        description: "Écran bleu récurrent (BSOD) sur le poste de travail. Erreur MEMORY_MANAGEMENT.",
        solution: "Tester la mémoire RAM avec memtest86. Remplacer les barrettes défectueuses. Mettre à jour les drivers.",
        category: "Système",
        status: "Résolu",
        priority: "Haute",
    },
    HistoricalTicket {
        id: 5,
        title: "Demande de nouveau logiciel",
        description: "Besoin d'installer Adobe Photoshop pour le service communication.",
        solution: "Vérifier la licence disponible. Installer via le centre logiciel ou manuellement avec clé de licence.",
        category: "Logiciel",
        status: "En cours",
        priority: "Moyenne",
    },
    HistoricalTicket {
        id: 6,
        title: "Sauvegarde échouée",
        description: "La sauvegarde automatique du serveur de fichiers a échoué cette nuit.",
        solution: "Vérifier l'espace disque disponible sur le NAS. Relancer la sauvegarde manuellement. Vérifier les logs.",
        category: "Base de données",
        status: "Résolu",
        priority: "Haute",
    },
    HistoricalTicket {
        id: 7,
        title: "Messagerie lente",
        description: "Outlook est très lent au démarrage et à la réception des emails.",
        solution: "Archiver les anciens emails. Vider le cache Outlook. Réparer le profil si nécessaire.",
        category: "Messagerie",
        status: "Résolu",
        priority: "Moyenne",
    },
    HistoricalTicket {
        id: 8,
        title: "Accès refusé au dossier partagé",
        description: "Impossible d'accéder au dossier \\\\serveur\\partage\\compta",
        solution: "Vérifier les permissions NTFS et les partages. Ajouter l'utilisateur au groupe approprié dans Active Directory.",
        category: "Accès",
        status: "Résolu",
        priority: "Moyenne",
    },
];

pub const KB_ARTICLES: &[KbArticle] = &[
    KbArticle {
        id: 1,
        title: "Configuration VPN - Guide complet",
        content: "# Configuration VPN Entreprise\n\n\
## Windows\n\
1. Télécharger le client Cisco AnyConnect depuis le portail intranet\n\
2. Installer avec les droits administrateur\n\
3. Configurer avec l'adresse: vpn.entreprise.com\n\
4. Utiliser vos identifiants Active Directory\n\n\
## macOS\n\
1. Télécharger Cisco AnyConnect pour Mac\n\
2. Installer le package DMG\n\
3. Autoriser l'extension système dans Préférences Système > Sécurité\n\
4. Se connecter avec vpn.entreprise.com\n\n\
## Dépannage\n\
- Vérifier la connexion internet\n\
- Désactiver temporairement l'antivirus\n\
- Vider le cache DNS: ipconfig /flushdns\n\
- Contacter le support si l'erreur persiste",
        category: "Réseau",
        views: 245,
    },
    KbArticle {
        id: 2,
        title: "Réinitialisation mot de passe",
        content: "# Procédure de réinitialisation de mot de passe\n\n\
## En libre-service\n\
1. Aller sur le portail de mots de passe\n\
2. Cliquer sur \"Mot de passe oublié\"\n\
3. Répondre aux questions de sécurité\n\
4. Définir un nouveau mot de passe\n\n\
## Politique de mot de passe\n\
- Minimum 12 caractères\n\
- Au moins une majuscule, une minuscule, un chiffre\n\
- Au moins un caractère spécial\n\
- Ne pas réutiliser les 5 derniers mots de passe\n\n\
## Contact helpdesk\n\
Si le reset en libre-service échoue, contacter le helpdesk.",
        category: "Compte",
        views: 523,
    },
    KbArticle {
        id: 3,
        title: "Optimisation Outlook",
        content: "# Guide d'optimisation d'Outlook\n\n\
## Archivage automatique\n\
1. Fichier > Outils > Nettoyer la boîte aux lettres\n\
2. Configurer l'archivage automatique (6 mois recommandé)\n\
3. Créer un fichier PST d'archive local\n\n\
## Performance\n\
- Désactiver les compléments inutiles\n\
- Mode cache Exchange: 3 mois recommandé\n\
- Compacter régulièrement le fichier OST\n\n\
## Problèmes courants\n\
- Outlook lent: réparer le profil\n\
- Erreurs de synchronisation: recréer le profil\n\
- Crash au démarrage: démarrer en mode sans échec",
        category: "Messagerie",
        views: 187,
    },
];

pub const FAQ_ITEMS: &[FaqItem] = &[
    FaqItem {
        id: 1,
        question: "Comment changer mon mot de passe Windows ?",
        answer: "Appuyez sur Ctrl+Alt+Suppr et sélectionnez 'Modifier le mot de passe'. Ou utilisez le portail en libre-service.",
        category: "Compte",
        popularity: 95,
    },
    FaqItem {
        id: 2,
        question: "Où trouver les pilotes d'imprimante ?",
        answer: "Les pilotes sont disponibles sur l'intranet dans la section 'Ressources IT' ou sur \\\\serveur\\drivers\\imprimantes",
        category: "Matériel",
        popularity: 78,
    },
    FaqItem {
        id: 3,
        question: "Comment accéder au VPN en télétravail ?",
        answer: "Utilisez Cisco AnyConnect avec l'adresse vpn.entreprise.com et vos identifiants habituels. Guide complet disponible sur l'intranet.",
        category: "Réseau",
        popularity: 89,
    },
    FaqItem {
        id: 4,
        question: "Quelle est la procédure pour demander un nouveau logiciel ?",
        answer: "Créez un ticket en précisant le logiciel souhaité, l'usage prévu et la validation de votre manager.",
        category: "Logiciel",
        popularity: 65,
    },
    FaqItem {
        id: 5,
        question: "Comment configurer ma messagerie sur mobile ?",
        answer: "Installez Microsoft Outlook sur votre mobile. Ajoutez votre adresse email professionnelle. Le profil Exchange se configurera automatiquement.",
        category: "Messagerie",
        popularity: 72,
    },
];

/// Manual question/answer pairs seeded into the corpus on first boot.
pub const SEED_CORPUS: &[(&str, &str)] = &[
    (
        "Le wifi du campus ne me connecte pas",
        "Oubliez le réseau wifi puis reconnectez-vous avec votre identifiant complet (prenom.nom) et votre mot de passe de messagerie.",
    ),
    (
        "Je n'ai pas accès à mon cours en ligne",
        "Vérifiez votre inscription pédagogique ; l'accès à la plateforme de cours est ouvert 24h après l'inscription administrative.",
    ),
    (
        "La visioconférence de la salle ne démarre pas",
        "Allumez l'écran de la salle avant le codec, puis sélectionnez la source HDMI « Visio » sur la télécommande.",
    ),
];

pub fn ticket_adapter() -> LexicalAdapter {
    let docs = TICKETS
        .iter()
        .map(|t| LexicalDoc {
            id: t.id.to_string(),
            title: t.title.to_owned(),
            content: format!("**Problème**: {}\n\n**Solution**: {}", t.description, t.solution),
            searchable: format!("{} {} {}", t.title, t.description, t.solution),
            metadata: json!({
                "category": t.category,
                "status": t.status,
                "priority": t.priority,
            }),
        })
        .collect();
    LexicalAdapter::new("tickets", SourceKind::LocalTicket, docs)
}

pub fn kb_adapter() -> LexicalAdapter {
    let docs = KB_ARTICLES
        .iter()
        .map(|a| LexicalDoc {
            id: a.id.to_string(),
            title: a.title.to_owned(),
            content: a.content.to_owned(),
            searchable: format!("{} {}", a.title, a.content),
            metadata: json!({ "category": a.category, "views": a.views }),
        })
        .collect();
    LexicalAdapter::new("knowledge_base", SourceKind::KbArticle, docs)
}

pub fn faq_adapter() -> LexicalAdapter {
    let docs = FAQ_ITEMS
        .iter()
        .map(|f| LexicalDoc {
            id: f.id.to_string(),
            title: f.question.to_owned(),
            content: format!("**Question**: {}\n\n**Réponse**: {}", f.question, f.answer),
            searchable: format!("{} {}", f.question, f.answer),
            metadata: json!({ "category": f.category, "popularity": f.popularity }),
        })
        .collect();
    LexicalAdapter::new("faq", SourceKind::Faq, docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::SourceAdapter;
    use crate::types::Category;

    #[test]
    fn catalog_sizes() {
        assert_eq!(ticket_adapter().len(), 8);
        assert_eq!(kb_adapter().len(), 3);
        assert_eq!(faq_adapter().len(), 5);
    }

    #[test]
    fn catalog_categories_are_known() {
        for t in TICKETS {
            assert!(Category::from_label(t.category).is_some(), "{}", t.category);
        }
        for f in FAQ_ITEMS {
            assert!(Category::from_label(f.category).is_some(), "{}", f.category);
        }
    }

    #[tokio::test]
    async fn ticket_content_renders_problem_and_solution() {
        let results = ticket_adapter().search("imprimante", 4).await;
        let top = &results[0];
        assert_eq!(top.source_kind, SourceKind::LocalTicket);
        assert!(top.content.starts_with("**Problème**"));
        assert!(top.content.contains("**Solution**"));
        assert_eq!(top.metadata["category"], "Matériel");
    }

    #[tokio::test]
    async fn solution_text_is_searchable() {
        // "memtest86" only appears in ticket 4's solution.
        let results = ticket_adapter().search("memtest86", 4).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_id, "4");
        assert_eq!(results[0].score, 1.0);
    }

    #[tokio::test]
    async fn faq_vpn_question_matches_exactly() {
        let results = faq_adapter().search("Comment accéder au VPN en télétravail ?", 4).await;
        assert_eq!(results[0].source_id, "3");
        assert_eq!(results[0].score, 1.0);
    }
}
