use super::types::NutritionalAnalysisResult;

pub const SYSTEM_PROMPT: &str = r#"You are a nutritionist specialising in Glycemic Index (GI) and Glycemic Load (GL).
Identify the food, estimate its ingredients and portion, and answer with a single JSON object:
{
  "foodName": string,
  "ingredients": [{"name": string, "estimatedWeightGrams": number, "carbsPer100g": number,
                   "totalCarbs": number, "glycemicIndex": number, "glycemicLoad": number, "calories": number}],
  "totalAvailableCarbsGrams": number,
  "glycemicIndex": number,
  "glycemicLoad": number,
  "confidenceScore": number,
  "nutritionalInfo": {"calories": number, "carbs": number, "protein": number, "fat": number, "fiber": number, "sugar": number},
  "analysis": string,
  "recommendations": [string],
  "sugarSpeed": "Slow" | "Moderate" | "Fast",
  "energyStability": "Stable" | "Unsteady" | "Crash",
  "addedSugar": {"detected": boolean, "source": string, "amount": number, "confidence": number},
  "addedSugarLikely": boolean
}
GL = GI x available carbs / 100. The root glycemicLoad is the sum of the ingredient loads."#;

pub fn text_prompt(name: &str, description: &str, context: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\nFood Name: \"{name}\"\nDescription: \"{description}\"\nContext: \"{context}\"\n\
         If the context gives a portion size or weight, scale carbs, GL and calories to it."
    )
}

pub fn refine_prompt(previous: &NutritionalAnalysisResult, feedback: &str, has_image: bool) -> String {
    let previous = serde_json::to_string(previous).unwrap_or_default();
    let subject = if has_image { "this image" } else { "this food item (no image available)" };
    format!(
        "{SYSTEM_PROMPT}\n\nYou previously analysed {subject} as:\n{previous}\n\n\
         The user corrected it: \"{feedback}\"\n\
         Trust the correction, recompute GL, sugar speed and stability, and keep the same JSON format. \
         Do not increase GL without an increase in carbohydrates."
    )
}

pub fn recommendations_prompt(food_name: &str) -> String {
    format!(
        "The user is eating \"{food_name}\", which likely has a high glycemic load.\n\
         Suggest 1-2 accessible, affordable alternatives or additions that lower it.\n\
         Answer with a JSON array of strings only."
    )
}
