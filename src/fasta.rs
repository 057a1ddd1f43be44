use crate::error::RefProtError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub id: String,
    pub description: String,
    pub sequence: String,
}

impl FastaRecord {
    /// Parses text holding exactly one FASTA record.
    pub fn parse(text: &str) -> Result<Self, RefProtError> {
        let mut lines = text
            .lines()
            .map(str::trim_end)
            .skip_while(|line| line.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| RefProtError::FastaParse("empty record".to_string()))?;
        let header = header.strip_prefix('>').ok_or_else(|| {
            RefProtError::FastaParse(format!("expected '>' header, got {header:?}"))
        })?;

        let (id, description) = match header.trim().split_once(char::is_whitespace) {
            Some((id, rest)) => (id.to_string(), rest.trim().to_string()),
            None => (header.trim().to_string(), String::new()),
        };
        if id.is_empty() {
            return Err(RefProtError::FastaParse("header has no identifier".to_string()));
        }

        let mut sequence = String::new();
        for line in lines {
            if line.starts_with('>') {
                return Err(RefProtError::FastaParse(
                    "expected a single record, found more".to_string(),
                ));
            }
            sequence.extend(line.chars().filter(|ch| !ch.is_whitespace()));
        }

        Ok(Self {
            id,
            description,
            sequence,
        })
    }

    pub fn len(&self) -> usize {
        self.sequence.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}
