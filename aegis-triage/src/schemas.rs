use crate::models::{Canonical, OverallRecommendation, RiskLevel, Severity, Urgency};
use crate::validator::{Field, FieldKind, Shape};

const DIFFERENTIAL_ITEM: &[Field] = &[
    Field::required("condition", FieldKind::Text),
    Field::required("probability", FieldKind::Integer { min: 0, max: 100 }),
    Field::required("recommendation", FieldKind::Text),
    Field::optional("suggested_medications", FieldKind::TextList),
];

pub static DIAGNOSIS: Shape = Shape {
    name: "diagnosis",
    fields: &[
        Field::required("differential", FieldKind::ObjectList(DIFFERENTIAL_ITEM)),
        Field::required("severity", FieldKind::Enum(Severity::DOMAIN)),
        Field::required("summary", FieldKind::Text),
    ],
};

pub static CRITIQUE: Shape = Shape {
    name: "critique",
    fields: &[
        Field::optional("missing_differentials", FieldKind::TextList),
        Field::optional("contraindications", FieldKind::TextList),
        Field::optional("risk_factors", FieldKind::TextList),
        Field::optional("severity_assessment", FieldKind::NullableText),
        Field::optional("bias_flags", FieldKind::TextList),
        Field::required("feedback", FieldKind::Text),
    ],
};

const GENOMIC_CONSIDERATION: &[Field] = &[
    Field::required("variant", FieldKind::Text),
    Field::required("effect", FieldKind::Text),
    Field::required("recommendation", FieldKind::Text),
];

const GENOMIC_REVIEW: &[Field] = &[
    Field::required("medication", FieldKind::Text),
    Field::required("metabolism", FieldKind::Text),
    Field::optional(
        "genetic_considerations",
        FieldKind::ObjectList(GENOMIC_CONSIDERATION),
    ),
    Field::optional("dose_adjustment", FieldKind::NullableText),
    Field::optional("alternative_medications", FieldKind::TextList),
    Field::required("risk_level", FieldKind::Enum(RiskLevel::DOMAIN)),
    Field::required("summary", FieldKind::Text),
    Field::required(
        "overall_recommendation",
        FieldKind::Enum(OverallRecommendation::DOMAIN),
    ),
];

pub static GENOMIC_PRECISION: Shape = Shape {
    name: "genomic precision review",
    fields: &[Field::required(
        "reviews",
        FieldKind::ObjectList(GENOMIC_REVIEW),
    )],
};

const DOSING_ADJUSTMENT: &[Field] = &[
    Field::required("medication", FieldKind::Text),
    Field::required("adjustment", FieldKind::Text),
];

const ADDRESSED_CONCERN: &[Field] = &[
    Field::required("concern", FieldKind::Text),
    Field::required("resolution", FieldKind::Text),
];

pub static REFINED_REPORT: Shape = Shape {
    name: "refined report",
    fields: &[
        Field::required("differential", FieldKind::ObjectList(DIFFERENTIAL_ITEM)),
        Field::required("severity", FieldKind::Enum(Severity::DOMAIN)),
        Field::required("summary", FieldKind::Text),
        Field::optional("genomic_notes", FieldKind::TextList),
        Field::required("recommendations", FieldKind::TextList),
        Field::optional(
            "dosing_adjustments",
            FieldKind::ObjectList(DOSING_ADJUSTMENT),
        ),
        Field::optional(
            "addressed_concerns",
            FieldKind::ObjectList(ADDRESSED_CONCERN),
        ),
    ],
};

pub static TRIAGE: Shape = Shape {
    name: "triage classification",
    fields: &[
        Field::required("urgency", FieldKind::Enum(Urgency::DOMAIN)),
        Field::required("reasoning", FieldKind::Text),
        Field::required("disposition", FieldKind::Text),
    ],
};
