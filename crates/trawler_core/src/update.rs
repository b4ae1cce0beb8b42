use crate::{CatalogStatus, CatalogTag, Effect, JoinState, Msg};

/// Pure update function: applies one merged-stream message to the join state
/// and returns the effects the caller must carry out, in order.
pub fn update(mut state: JoinState, msg: Msg) -> (JoinState, Vec<Effect>) {
    if state.is_closed() {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Item(tagged) => {
            // A catalog that already ended cannot contribute further items.
            if state.status(tagged.tag).is_terminal() {
                return (state, Vec::new());
            }
            let Some(pairs) = state.observe(tagged.tag, tagged.id()) else {
                return (state, Vec::new());
            };
            let mut effects = Vec::with_capacity(pairs.len() + 1);
            effects.push(Effect::ForwardItem(tagged));
            effects.extend(pairs.into_iter().map(Effect::EmitPair));
            effects
        }
        Msg::CatalogCompleted(tag) => finish_catalog(&mut state, tag, CatalogStatus::Completed),
        Msg::CatalogFailed(tag) => finish_catalog(&mut state, tag, CatalogStatus::Failed),
        Msg::Cancelled => {
            state.mark_cancelled();
            state.close();
            vec![Effect::Close]
        }
    };

    (state, effects)
}

fn finish_catalog(state: &mut JoinState, tag: CatalogTag, status: CatalogStatus) -> Vec<Effect> {
    if state.status(tag).is_terminal() {
        return Vec::new();
    }
    state.set_status(tag, status);

    let mut effects = Vec::with_capacity(2);
    if status == CatalogStatus::Failed {
        effects.push(Effect::ReportFailure(tag));
    }
    if state.all_terminal() {
        state.close();
        effects.push(Effect::Close);
    }
    effects
}
