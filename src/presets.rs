//! Built-in organism panels.

#[derive(Debug, PartialEq, Eq)]
pub struct OrganismPreset {
    pub key: &'static str,
    pub organism_name: &'static str,
    pub proteins: &'static [&'static str],
    pub strain_overrides: &'static [(&'static str, &'static str)],
}

pub static PRESETS: &[OrganismPreset] = &[
    OrganismPreset {
        key: "ecoli",
        organism_name: "Escherichia coli",
        proteins: &[
            // AcrAB-TolC pump and AcrZ
            "AcrA", "AcrB", "TolC", "AcrZ",
            // transcriptional regulators
            "AcrR", "MarA", "MarR", "RamA", "RamR", "SoxS", "Rob", "EnvR",
            // other efflux pumps
            "AcrD", "AcrE", "AcrF", "MdtB", "MdtC",
        ],
        strain_overrides: &[("AcrA", "K-12 MG1655"), ("AcrB", "K-12 MG1655")],
    },
    OrganismPreset {
        key: "klebsiella",
        organism_name: "Klebsiella pneumoniae",
        proteins: &[
            "OqxA", "OqxB", "EefA", "EefB", "EefC", "KexD", "KexE", "KexF",
        ],
        strain_overrides: &[],
    },
];

impl OrganismPreset {
    /// Matches either the preset key or its canonical organism name.
    pub fn lookup(organism: &str) -> Option<&'static OrganismPreset> {
        let organism = organism.trim();
        PRESETS.iter().find(|preset| {
            preset.key.eq_ignore_ascii_case(organism)
                || preset.organism_name.eq_ignore_ascii_case(organism)
        })
    }

    /// Strain pinned for this exact protein name, if any.
    pub fn strain_for(&self, protein_name: &str) -> Option<&'static str> {
        self.strain_overrides
            .iter()
            .find(|(protein, _)| *protein == protein_name)
            .map(|(_, strain)| *strain)
    }

    pub fn protein_panel(&self) -> Vec<String> {
        self.proteins.iter().map(|name| name.to_string()).collect()
    }
}

/// Organism name used in queries: the canonical name for presets, the
/// free text otherwise.
pub fn canonical_organism(organism: &str) -> String {
    OrganismPreset::lookup(organism)
        .map(|preset| preset.organism_name.to_string())
        .unwrap_or_else(|| organism.trim().to_string())
}
