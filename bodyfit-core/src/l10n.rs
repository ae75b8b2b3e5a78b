//! Localized retake guidance.

use serde::Serialize;

use crate::classifier::RejectionReason;

const TOO_CLOSE_M: f64 = 1.2;
const TOO_FAR_M: f64 = 3.0;

/// Supported response languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    En,
    Es,
    De,
    Tr,
    Fr,
}

impl Lang {
    pub fn as_str(self) -> &'static str {
        match self {
            Lang::En => "en",
            Lang::Es => "es",
            Lang::De => "de",
            Lang::Tr => "tr",
            Lang::Fr => "fr",
        }
    }

    /// Normalize a language tag such as `de-DE,de;q=0.9` to a supported language.
    ///
    /// Only the first comma segment is considered. Unknown tags fall back to English.
    pub fn resolve(raw: Option<&str>) -> Lang {
        let Some(raw) = raw else {
            return Lang::En;
        };
        let tag = raw
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        Self::from_code(&tag)
            .or_else(|| tag.get(..2).and_then(Self::from_code))
            .unwrap_or_default()
    }

    fn from_code(code: &str) -> Option<Lang> {
        match code {
            "en" => Some(Lang::En),
            "es" => Some(Lang::Es),
            "de" => Some(Lang::De),
            "tr" => Some(Lang::Tr),
            "fr" => Some(Lang::Fr),
            _ => None,
        }
    }
}

/// Kinds of retake guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipKind {
    Blur,
    Shoulders,
    Tilt,
    FrontFace,
    SideTurn,
    TooClose,
    TooFar,
    Generic,
}

impl TipKind {
    pub fn text(self, lang: Lang) -> &'static str {
        use Lang::*;
        use TipKind::*;
        match (self, lang) {
            (Blur, En) => "Photo is blurry. Hold the phone steady and use good lighting.",
            (Blur, Es) => "La foto está borrosa. Sujeta el teléfono firme y usa buena iluminación.",
            (Blur, De) => "Das Foto ist unscharf. Halte das Handy ruhig und sorge für gutes Licht.",
            (Blur, Tr) => "Fotoğraf bulanık. Telefonu sabit tutun ve iyi aydınlatma kullanın.",
            (Blur, Fr) => "La photo est floue. Tenez le téléphone immobile avec un bon éclairage.",

            (Shoulders, En) => "Step closer so both shoulders are clearly visible.",
            (Shoulders, Es) => "Acércate para que ambos hombros se vean claramente.",
            (Shoulders, De) => "Komm näher, damit beide Schultern gut sichtbar sind.",
            (Shoulders, Tr) => "İki omzunuz da net görünecek şekilde yaklaşın.",
            (Shoulders, Fr) => "Rapprochez-vous pour que les deux épaules soient bien visibles.",

            (Tilt, En) => "Hold the phone level. The camera is tilted.",
            (Tilt, Es) => "Mantén el teléfono recto. La cámara está inclinada.",
            (Tilt, De) => "Halte das Handy gerade. Die Kamera ist geneigt.",
            (Tilt, Tr) => "Telefonu düz tutun. Kamera eğik.",
            (Tilt, Fr) => "Tenez le téléphone droit. L'appareil est incliné.",

            (FrontFace, En) => "For the front photo, face the camera directly.",
            (FrontFace, Es) => "Para la foto frontal, mira directamente a la cámara.",
            (FrontFace, De) => "Für das Frontfoto schau direkt in die Kamera.",
            (FrontFace, Tr) => "Ön fotoğraf için doğrudan kameraya bakın.",
            (FrontFace, Fr) => "Pour la photo de face, regardez directement l'appareil.",

            (SideTurn, En) => "For the side photo, turn 90 degrees to the camera.",
            (SideTurn, Es) => "Para la foto lateral, gira 90 grados respecto a la cámara.",
            (SideTurn, De) => "Für das Seitenfoto dreh dich um 90 Grad zur Kamera.",
            (SideTurn, Tr) => "Yan fotoğraf için kameraya 90 derece dönün.",
            (SideTurn, Fr) => "Pour la photo de profil, tournez-vous de 90 degrés.",

            (TooClose, En) => "You are too close. Step back until your whole body fits.",
            (TooClose, Es) => "Estás demasiado cerca. Retrocede hasta que se vea todo tu cuerpo.",
            (TooClose, De) => "Du bist zu nah. Geh zurück, bis dein ganzer Körper im Bild ist.",
            (TooClose, Tr) => "Çok yakınsınız. Tüm vücudunuz görünene kadar geri çekilin.",
            (TooClose, Fr) => "Vous êtes trop près. Reculez pour que tout le corps soit visible.",

            (TooFar, En) => "You are too far away. Step closer to the camera.",
            (TooFar, Es) => "Estás demasiado lejos. Acércate a la cámara.",
            (TooFar, De) => "Du bist zu weit weg. Komm näher an die Kamera.",
            (TooFar, Tr) => "Çok uzaktasınız. Kameraya yaklaşın.",
            (TooFar, Fr) => "Vous êtes trop loin. Rapprochez-vous de l'appareil.",

            (Generic, En) => "Please retake the photo in good light, standing straight and fully visible.",
            (Generic, Es) => "Vuelve a tomar la foto con buena luz, de pie y completamente visible.",
            (Generic, De) => "Bitte mach das Foto bei gutem Licht neu, aufrecht und vollständig sichtbar.",
            (Generic, Tr) => "Lütfen fotoğrafı iyi ışıkta, dik durarak ve tamamen görünür şekilde yeniden çekin.",
            (Generic, Fr) => "Veuillez reprendre la photo avec une bonne lumière, debout et entièrement visible.",
        }
    }
}

/// The tip addressing `reason`, falling back to distance-based guidance.
pub fn tip_kind_for(reason: &RejectionReason, distance_m: Option<f64>) -> TipKind {
    match reason {
        RejectionReason::LowFocus { .. } => TipKind::Blur,
        RejectionReason::ShouldersNotVisible => TipKind::Shoulders,
        RejectionReason::CameraTilt { .. } => TipKind::Tilt,
        RejectionReason::NotFacingCamera => TipKind::FrontFace,
        RejectionReason::NotTurnedEnough => TipKind::SideTurn,
        RejectionReason::DecodeFailed => match distance_m {
            Some(d) if d < TOO_CLOSE_M => TipKind::TooClose,
            Some(d) if d > TOO_FAR_M => TipKind::TooFar,
            _ => TipKind::Generic,
        },
    }
}

/// Deduplicated tips for one rejected photo; never empty.
pub fn tips_for_rejection(
    reasons: &[RejectionReason],
    distance_m: Option<f64>,
    lang: Lang,
) -> Vec<String> {
    let mut tips = Vec::new();
    for reason in reasons {
        push_unique(&mut tips, tip_kind_for(reason, distance_m).text(lang));
    }
    if tips.is_empty() {
        tips.push(TipKind::Generic.text(lang).to_string());
    }
    tips
}

/// Append `item` unless it is already present, keeping first-seen order.
pub(crate) fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_language_tags() {
        assert_eq!(Lang::resolve(Some("de-DE,de;q=0.9,en;q=0.8")), Lang::De);
        assert_eq!(Lang::resolve(Some("FR")), Lang::Fr);
        assert_eq!(Lang::resolve(Some("tr_TR")), Lang::Tr);
        assert_eq!(Lang::resolve(Some("ja-JP")), Lang::En);
        assert_eq!(Lang::resolve(Some("")), Lang::En);
        assert_eq!(Lang::resolve(Some("e")), Lang::En);
        assert_eq!(Lang::resolve(None), Lang::En);
    }

    #[test]
    fn each_reason_maps_to_its_tip() {
        let reasons = [
            RejectionReason::LowFocus { focus: 1.0, min: 200.0 },
            RejectionReason::ShouldersNotVisible,
            RejectionReason::CameraTilt { roll_deg: 15.0, max: 10.0 },
            RejectionReason::NotFacingCamera,
        ];
        let tips = tips_for_rejection(&reasons, None, Lang::En);
        assert_eq!(tips.len(), 4);
        assert_eq!(tips[0], TipKind::Blur.text(Lang::En));
        assert_eq!(tips[3], TipKind::FrontFace.text(Lang::En));
    }

    #[test]
    fn distance_guides_unmapped_reasons() {
        let reason = RejectionReason::DecodeFailed;
        assert_eq!(tip_kind_for(&reason, Some(0.8)), TipKind::TooClose);
        assert_eq!(tip_kind_for(&reason, Some(4.0)), TipKind::TooFar);
        assert_eq!(tip_kind_for(&reason, Some(2.0)), TipKind::Generic);
        assert_eq!(tip_kind_for(&reason, None), TipKind::Generic);
    }

    #[test]
    fn tips_are_deduplicated_and_never_empty() {
        let reasons = [
            RejectionReason::LowFocus { focus: 1.0, min: 200.0 },
            RejectionReason::LowFocus { focus: 2.0, min: 200.0 },
        ];
        assert_eq!(tips_for_rejection(&reasons, None, Lang::Es).len(), 1);
        assert_eq!(
            tips_for_rejection(&[], None, Lang::De),
            vec![TipKind::Generic.text(Lang::De).to_string()]
        );
    }
}
