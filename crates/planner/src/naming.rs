use shared::{domain::Format, error::WorkflowError};

/// `"<room> - <S|F> - <film>"`, the only shape a renamed block may have.
pub fn compose_block_name(
    room: &str,
    format: Format,
    film_name: &str,
) -> Result<String, WorkflowError> {
    let film_name = film_name.trim();
    if film_name.is_empty() {
        return Err(WorkflowError::InvalidFilmName);
    }
    Ok(format!("{} - {} - {film_name}", room.trim(), format.tag()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_canonical_name() {
        assert_eq!(
            compose_block_name("Salle2", Format::Scope, "Inception").expect("name"),
            "Salle2 - S - Inception"
        );
        assert_eq!(
            compose_block_name("Brunet", Format::Flat, " Norvege ").expect("name"),
            "Brunet - F - Norvege"
        );
    }

    #[test]
    fn empty_film_name_is_rejected() {
        assert_eq!(
            compose_block_name("Salle2", Format::Scope, ""),
            Err(WorkflowError::InvalidFilmName)
        );
        assert_eq!(
            compose_block_name("Salle2", Format::Flat, "   "),
            Err(WorkflowError::InvalidFilmName)
        );
    }

    #[test]
    fn composed_name_carries_block_tag_of_its_format() {
        let name = compose_block_name("Brunet", Format::Scope, "Mercy").expect("name");
        let block = shared::domain::Block::new(1, name);
        assert_eq!(block.suffix_tag(), Some(Format::Scope));
    }
}
